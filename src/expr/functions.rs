//! Function allow-lists.
//!
//! Formulas may only call functions named here; anything else fails
//! compilation with an unsupported-function error rather than leaking
//! arbitrary SQL through to the database.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use super::ast::Exp;

/// Aggregate functions. Their presence in a formula moves the containing
/// condition from WHERE to HAVING.
pub static SQL_AGGREGATES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "SUM",
        "AVG",
        "COUNT",
        "MIN",
        "MAX",
        "GROUP_CONCAT",
        "STDDEV",
        "VARIANCE",
    ]
    .into_iter()
    .collect()
});

/// All functions accepted in SQL formulas.
pub static SQL_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    let mut set: HashSet<&'static str> = [
        // math
        "ABS",
        "CEIL",
        "CEILING",
        "FLOOR",
        "ROUND",
        "TRUNCATE",
        "MOD",
        "POWER",
        "SQRT",
        "EXP",
        "LN",
        "LOG",
        "LOG10",
        "SIGN",
        "RAND",
        "PI",
        "GREATEST",
        "LEAST",
        // date and time
        "NOW",
        "CURDATE",
        "CURRENT_DATE",
        "CURRENT_TIMESTAMP",
        "DATE",
        "YEAR",
        "MONTH",
        "DAY",
        "HOUR",
        "MINUTE",
        "SECOND",
        "QUARTER",
        "WEEK",
        "DAYOFWEEK",
        "DAYOFYEAR",
        "DATE_FORMAT",
        "DATE_ADD",
        "DATE_SUB",
        "DATEDIFF",
        "LAST_DAY",
        // string
        "CONCAT",
        "CONCAT_WS",
        "SUBSTRING",
        "SUBSTR",
        "LEFT",
        "RIGHT",
        "LENGTH",
        "CHAR_LENGTH",
        "LOWER",
        "UPPER",
        "TRIM",
        "LTRIM",
        "RTRIM",
        "REPLACE",
        "LPAD",
        "RPAD",
        "INSTR",
        "LOCATE",
        "REVERSE",
        "FORMAT",
        // null handling and branching
        "COALESCE",
        "IFNULL",
        "NULLIF",
        "IF",
        "ISNULL",
    ]
    .into_iter()
    .collect();
    set.extend(SQL_AGGREGATES.iter());
    set
});

/// Whether `name` (already uppercased) is allowed in SQL formulas.
pub fn is_allowed_sql(name: &str) -> bool {
    SQL_FUNCTIONS.contains(name)
}

/// Whether the tree calls any aggregate function.
pub fn has_aggregate(exp: &Exp) -> bool {
    let mut found = false;
    exp.walk(&mut |node| {
        if let Exp::Function { name, .. } = node {
            if SQL_AGGREGATES.contains(name.as_str()) {
                found = true;
            }
        }
    });
    found
}

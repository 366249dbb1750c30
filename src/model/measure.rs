//! Measure definitions.

use std::sync::OnceLock;

use super::types::Aggregation;
use crate::error::Result;
use crate::expr::{self, Exp};

/// A numeric, aggregatable column, optionally derived from a formula over
/// other measures and properties (e.g. `loadingValue + unloadingValue`).
///
/// The formula text compiles lazily, once, to an immutable [`Exp`]; the
/// compiled form is shared by every request that touches the measure.
#[derive(Debug)]
pub struct Measure {
    pub name: String,
    pub caption: String,
    /// Backing column on the fact table (logical name).
    pub column: String,
    pub aggregation: Aggregation,
    pub formula: Option<String>,
    compiled: OnceLock<Exp>,
}

impl Measure {
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        aggregation: Aggregation,
    ) -> Measure {
        let name = name.into();
        Measure {
            caption: name.clone(),
            name,
            column: column.into(),
            aggregation,
            formula: None,
            compiled: OnceLock::new(),
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Measure {
        self.formula = Some(formula.into());
        self
    }

    /// The compiled formula expression, or `None` for a plain column measure.
    pub fn formula_exp(&self) -> Result<Option<&Exp>> {
        let Some(text) = &self.formula else {
            return Ok(None);
        };
        if let Some(exp) = self.compiled.get() {
            return Ok(Some(exp));
        }
        let exp = expr::compile(text)?;
        // A concurrent compile of the same text produces an equal tree.
        let _ = self.compiled.set(exp);
        Ok(self.compiled.get())
    }
}

impl Clone for Measure {
    fn clone(&self) -> Self {
        Measure {
            name: self.name.clone(),
            caption: self.caption.clone(),
            column: self.column.clone(),
            aggregation: self.aggregation,
            formula: self.formula.clone(),
            compiled: OnceLock::new(),
        }
    }
}

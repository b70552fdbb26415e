//! Reference model that serves points without a physics engine.
//!
//! Setpoints written through `set` are copied onto their readbacks by suffix
//! rules (`:BCTRL` to `:BACT` by default), which is enough to exercise the
//! full write, evaluate and refresh cycle.

use std::collections::BTreeMap;

use tracing::info;
use va_core::PointValue;
use va_records::RecordStore;
use va_sim::{ModelAdapter, ModelError, ModelResult};

/// Copies a written setpoint onto its readback: `STEM:<from>` to `STEM:<to>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRule {
    pub from: String,
    pub to: String,
}

impl MirrorRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    fn target(&self, name: &str) -> Option<String> {
        name.strip_suffix(&self.from)
            .filter(|stem| stem.ends_with(':'))
            .map(|stem| format!("{}{}", stem, self.to))
    }
}

#[derive(Debug, Clone)]
pub struct MirrorModel {
    initial: BTreeMap<String, PointValue>,
    values: BTreeMap<String, PointValue>,
    rules: Vec<MirrorRule>,
    reset_point: Option<String>,
    resets: u64,
}

impl MirrorModel {
    pub fn new(initial: BTreeMap<String, PointValue>) -> Self {
        Self {
            values: initial.clone(),
            initial,
            rules: vec![MirrorRule::new("BCTRL", "BACT")],
            reset_point: None,
            resets: 0,
        }
    }

    /// Every field of `store` with its current value.
    pub fn from_store(store: &RecordStore) -> Self {
        Self::new(
            store
                .catalog()
                .into_iter()
                .map(|field| (field.name, field.value))
                .collect(),
        )
    }

    /// Replace the mirror rules.
    pub fn with_rules(mut self, rules: Vec<MirrorRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_reset_point(mut self, name: impl Into<String>) -> Self {
        self.reset_point = Some(name.into());
        self
    }

    /// Restore the initial values.
    pub fn reset(&mut self) {
        self.values = self.initial.clone();
        self.resets += 1;
        info!(resets = self.resets, "model reset");
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn value(&self, name: &str) -> Option<&PointValue> {
        self.values.get(name)
    }

    fn is_reset_point(&self, name: &str) -> bool {
        self.reset_point.as_deref() == Some(name)
    }
}

impl ModelAdapter for MirrorModel {
    fn get(&mut self, names: &[String]) -> ModelResult<BTreeMap<String, PointValue>> {
        names
            .iter()
            .map(|name| {
                if self.is_reset_point(name) {
                    return Ok((name.clone(), PointValue::Int(0)));
                }
                self.values
                    .get(name)
                    .map(|v| (name.clone(), v.clone()))
                    .ok_or_else(|| ModelError::UnknownIdentifier { name: name.clone() })
            })
            .collect()
    }

    fn set(&mut self, values: &BTreeMap<String, PointValue>) -> ModelResult<()> {
        for (name, value) in values {
            if self.is_reset_point(name) {
                self.reset();
                continue;
            }
            let Some(slot) = self.values.get_mut(name) else {
                return Err(ModelError::UnknownIdentifier { name: name.clone() });
            };
            if std::mem::discriminant(slot) != std::mem::discriminant(value) {
                return Err(ModelError::InvalidValue {
                    name: name.clone(),
                    message: format!("expected {}, got {}", slot.kind_name(), value.kind_name()),
                });
            }
            *slot = value.clone();

            for rule in &self.rules {
                if let Some(target) = rule.target(name) {
                    if let Some(readback) = self.values.get_mut(&target) {
                        *readback = value.clone();
                    }
                }
            }
        }
        Ok(())
    }
}

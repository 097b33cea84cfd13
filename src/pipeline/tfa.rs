// src/pipeline/tfa.rs

//! Threshold-flow-accumulation range parsing.

use std::str::FromStr;

use crate::errors::{DemflowError, Result};

/// Whether the `stop` value of a `start:stop:step` range is included.
///
/// The field scripts this pipeline grew out of disagreed between revisions;
/// the bound is therefore an explicit configuration choice, defaulting to
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBound {
    #[default]
    Inclusive,
    Exclusive,
}

/// An arithmetic range of TFA values, e.g. `1000:5000:1000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TfaRange {
    pub start: u64,
    pub stop: u64,
    pub step: u64,
    pub bound: StopBound,
}

impl TfaRange {
    /// Parse `start:stop:step` and attach the given stop bound.
    pub fn parse(s: &str, bound: StopBound) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let [start, stop, step] = parts.as_slice() else {
            return Err(DemflowError::Configuration(format!(
                "TFA range must be start:stop:step, got '{s}'"
            )));
        };

        let parse = |what: &str, v: &str| -> Result<u64> {
            u64::from_str(v.trim()).map_err(|_| {
                DemflowError::Configuration(format!(
                    "TFA {what} must be a non-negative integer, got '{v}'"
                ))
            })
        };

        let range = TfaRange {
            start: parse("start", start)?,
            stop: parse("stop", stop)?,
            step: parse("step", step)?,
            bound,
        };

        if range.step == 0 {
            return Err(DemflowError::Configuration(
                "TFA step must be at least 1".to_string(),
            ));
        }
        if range.stop < range.start {
            return Err(DemflowError::Configuration(format!(
                "TFA stop ({}) must not be below start ({})",
                range.stop, range.start
            )));
        }

        Ok(range)
    }

    /// The concrete threshold values, in ascending order.
    pub fn thresholds(&self) -> Vec<u64> {
        let mut values = Vec::new();
        let mut v = self.start;
        loop {
            let in_range = match self.bound {
                StopBound::Inclusive => v <= self.stop,
                StopBound::Exclusive => v < self.stop,
            };
            if !in_range {
                break;
            }
            values.push(v);
            v = match v.checked_add(self.step) {
                Some(next) => next,
                None => break,
            };
        }
        values
    }
}

//! Declarative trigger configuration.

use std::sync::Arc;
use std::time::Duration;

use weir_core::Clock;

use crate::error::TriggerError;
use crate::{CountingTrigger, DelayTrigger, MultiTrigger, Trigger, WatermarkTrigger};

/// Describes a trigger composition without constructing it.
///
/// Lets the embedding layer (config files, query planner) talk about triggers
/// as data; [`build`](TriggerSpec::build) turns the description into a live
/// [`Trigger`] with the supplied clock.
#[derive(Debug, Clone)]
pub enum TriggerSpec {
    /// Fire a key after this many receipts.
    Counting { threshold: u64 },
    /// Fire keys covered by the event-time watermark.
    Watermark,
    /// Fire keys inactive for this processing-time duration.
    Delay { delay: Duration },
    /// Fire when any of the nested specs fires.
    Any(Vec<TriggerSpec>),
}

impl TriggerSpec {
    pub fn build(&self, clock: Arc<dyn Clock>) -> Result<Trigger, TriggerError> {
        match self {
            TriggerSpec::Counting { threshold } => {
                Ok(CountingTrigger::new(*threshold)?.into())
            }
            TriggerSpec::Watermark => Ok(WatermarkTrigger::new().into()),
            TriggerSpec::Delay { delay } => {
                Ok(DelayTrigger::new(*delay, clock)?.into())
            }
            TriggerSpec::Any(specs) => {
                let children = specs
                    .iter()
                    .map(|spec| spec.build(clock.clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(MultiTrigger::new(children).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_core::ManualClock;

    #[test]
    fn test_build_composition() {
        let clock = Arc::new(ManualClock::new(0));
        let spec = TriggerSpec::Any(vec![
            TriggerSpec::Watermark,
            TriggerSpec::Delay {
                delay: Duration::from_secs(10),
            },
        ]);
        assert!(matches!(spec.build(clock).unwrap(), Trigger::Multi(_)));
    }

    #[test]
    fn test_invalid_spec_is_config_error() {
        let clock = Arc::new(ManualClock::new(0));
        let spec = TriggerSpec::Counting { threshold: 0 };
        assert!(matches!(
            spec.build(clock),
            Err(TriggerError::Config(_))
        ));
    }
}

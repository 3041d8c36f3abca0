//! Trigger broadcast.

use std::sync::Arc;

use crate::bus::{BusTopology, TriggerBus, TriggerMessage};
use crate::check_set::ExpectedCheckSet;
use crate::context::{CheckContext, CorrelationId};
use crate::error::{ReleasabilityError, Result};
use crate::obs;

/// Broadcasts one trigger per remote check onto the trigger topic.
pub struct TriggerPublisher {
    bus: Arc<dyn TriggerBus>,
    topology: BusTopology,
}

impl TriggerPublisher {
    pub fn new(bus: Arc<dyn TriggerBus>, topology: BusTopology) -> Self {
        Self { bus, topology }
    }

    /// Publish triggers for every check in `checks`.
    ///
    /// Not retried: the first failure aborts with
    /// [`ReleasabilityError::Publish`], since a partial broadcast would leave
    /// the remaining checks to time out. Returns the bus message ids.
    pub async fn publish(
        &self,
        context: &CheckContext,
        correlation_id: &CorrelationId,
        checks: &ExpectedCheckSet,
    ) -> Result<Vec<String>> {
        let mut message_ids = Vec::with_capacity(checks.len());

        for check in checks.iter() {
            let trigger = TriggerMessage::new(
                context,
                correlation_id,
                &self.topology.result_topic,
                Some(check),
            )?;

            let message_id = self
                .bus
                .publish(&self.topology.trigger_topic, &trigger)
                .await
                .map_err(|source| ReleasabilityError::Publish {
                    check: check.to_string(),
                    published: message_ids.len(),
                    total: checks.len(),
                    source,
                })?;

            obs::emit_trigger_published(correlation_id.as_str(), check, &message_id);
            message_ids.push(message_id);
        }

        Ok(message_ids)
    }
}

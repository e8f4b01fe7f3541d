//! Bounded waiting for array resync completion
//!
//! mdadm runs recovery and reshape in the background; operations that need a
//! consistent array poll its state until it settles. The wait is bounded so
//! a stalled rebuild surfaces as an error instead of hanging forever, and
//! any state other than clean or an in-flight resync aborts immediately.

use crate::domain::ports::ArrayState;
use crate::error::{Error, Result};
use crate::topology::Topology;
use std::time::Duration;
use tracing::{debug, info};

/// Polling bounds for resync waits
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    /// Delay between state polls
    pub interval: Duration,
    /// Poll limit; `None` waits indefinitely
    pub max_polls: Option<u32>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        // 960 polls at 15s is four hours, enough for a rebuild of any
        // reasonably sized array.
        Self {
            interval: Duration::from_secs(15),
            max_polls: Some(960),
        }
    }
}

impl WaitPolicy {
    /// Zero-delay policy for tests and simulated backends.
    pub fn immediate() -> Self {
        Self {
            interval: Duration::ZERO,
            max_polls: Some(100),
        }
    }
}

/// Wait until `array` reports clean. Recovering and reshaping states are
/// waited out; anything else fails straight away.
pub async fn wait_for_array_clean(
    topology: &mut Topology,
    array: &str,
    policy: &WaitPolicy,
) -> Result<()> {
    let mut polls = 0u32;
    loop {
        topology.refresh_array(array).await?;
        let entity = topology.get_array(array)?;
        match &entity.state {
            ArrayState::Clean => {
                debug!(array, polls, "array clean");
                return Ok(());
            }
            ArrayState::Recovering | ArrayState::Reshaping => {
                info!(
                    array,
                    state = %entity.state,
                    percent = entity.rebuild_percent,
                    "waiting for resync"
                );
            }
            ArrayState::Unknown(_) => {
                return Err(Error::UnexpectedArrayState {
                    array: array.to_string(),
                    state: entity.state.to_string(),
                });
            }
        }

        polls += 1;
        if let Some(max) = policy.max_polls {
            if polls > max {
                return Err(Error::ResyncTimeout {
                    array: array.to_string(),
                    polls,
                });
            }
        }
        tokio::time::sleep(policy.interval).await;
    }
}

/// Wait until every array backing `lv` reports clean.
pub async fn wait_for_lv_clean(
    topology: &mut Topology,
    lv: &str,
    policy: &WaitPolicy,
) -> Result<()> {
    for array in topology.lv_arrays(lv)? {
        wait_for_array_clean(topology, &array, policy).await?;
    }
    Ok(())
}

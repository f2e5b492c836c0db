use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::{DeviceProvider, Error, Result};

/// How long to wait for a device to be connected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryBudget {
    /// number of discovery attempts, at least 1
    pub max_attempts: u32,
    /// seconds to wait after an attempt that found nothing
    pub wait_secs: u64,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            wait_secs: 10,
        }
    }
}

/// Progress of [`acquire_devices`] while it waits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquireEvent {
    /// attempt `attempt` found nothing, waiting `wait_secs` before the next one
    Waiting {
        attempt: u32,
        max_attempts: u32,
        wait_secs: u64,
    },
    /// `elapsed_secs` seconds of the wait after attempt `attempt` have passed
    Tick { attempt: u32, elapsed_secs: u64 },
}

/// Asks `provider` for devices until it reports at least one, waiting between attempts.
///
/// Makes at most `budget.max_attempts` attempts and returns [`Error::DeviceNotFound`] when all
/// of them come back empty. There is no wait after the last attempt.
pub fn acquire_devices<P: DeviceProvider>(
    provider: &mut P,
    budget: RetryBudget,
    mut observer: impl FnMut(AcquireEvent),
) -> Result<Vec<P::Device>> {
    if budget.max_attempts == 0 {
        return Err(Error::InvalidArgument(
            "max_attempts must be at least 1".to_string(),
        ));
    }

    for attempt in 1..=budget.max_attempts {
        let devices = provider.try_create_devices()?;
        if !devices.is_empty() {
            log::info!("found {} device(s) on attempt {attempt}", devices.len());
            return Ok(devices);
        }
        if attempt == budget.max_attempts {
            break;
        }

        log::info!(
            "Try {attempt} of {}: waiting for {} secs for a device to be connected",
            budget.max_attempts,
            budget.wait_secs
        );
        observer(AcquireEvent::Waiting {
            attempt,
            max_attempts: budget.max_attempts,
            wait_secs: budget.wait_secs,
        });
        for elapsed_secs in 1..=budget.wait_secs {
            thread::sleep(Duration::from_secs(1));
            log::debug!("{elapsed_secs} seconds passed");
            observer(AcquireEvent::Tick {
                attempt,
                elapsed_secs,
            });
        }
    }

    Err(Error::DeviceNotFound {
        attempts: budget.max_attempts,
    })
}

/// [`acquire_devices`], then lets the provider pick one of the devices.
pub fn acquire_device<P: DeviceProvider>(
    provider: &mut P,
    budget: RetryBudget,
    observer: impl FnMut(AcquireEvent),
) -> Result<P::Device> {
    let devices = acquire_devices(provider, budget, observer)?;
    provider.select(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_camera::{VirtualCameraConfig, VirtualSystem};
    use crate::Device;

    fn system_appearing_after(appear_after: u32) -> VirtualSystem {
        VirtualSystem::new(VirtualCameraConfig {
            appear_after,
            ..VirtualCameraConfig::default()
        })
    }

    fn budget(max_attempts: u32) -> RetryBudget {
        RetryBudget {
            max_attempts,
            wait_secs: 0,
        }
    }

    #[test]
    fn gives_up_after_exactly_max_attempts() {
        for max_attempts in 1..=6 {
            let mut system = system_appearing_after(u32::MAX);
            let err = acquire_device(&mut system, budget(max_attempts), |_| {}).unwrap_err();

            assert!(matches!(err, Error::DeviceNotFound { attempts } if attempts == max_attempts));
            assert_eq!(system.attempts(), max_attempts);
        }
    }

    #[test]
    fn stops_at_the_first_non_empty_attempt() {
        for max_attempts in 1..=5u32 {
            for k in 1..=max_attempts {
                let mut system = system_appearing_after(k - 1);
                acquire_device(&mut system, budget(max_attempts), |_| {}).unwrap();
                assert_eq!(system.attempts(), k);
            }
        }
    }

    #[test]
    fn device_appears_on_fourth_attempt() {
        let mut system = system_appearing_after(3);
        let mut waits = Vec::new();

        let device = acquire_device(&mut system, budget(6), |event| waits.push(event)).unwrap();

        assert_eq!(system.attempts(), 4);
        assert_eq!(device.info().model_name, "Virtual Camera");
        assert_eq!(
            waits,
            (1..=3)
                .map(|attempt| AcquireEvent::Waiting {
                    attempt,
                    max_attempts: 6,
                    wait_secs: 0
                })
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn returns_every_device_found() {
        let mut system = VirtualSystem::new(VirtualCameraConfig {
            device_count: 3,
            ..VirtualCameraConfig::default()
        });
        let devices = acquire_devices(&mut system, budget(1), |_| {}).unwrap();
        let serials: Vec<_> = devices
            .iter()
            .map(|device| device.info().serial_number.clone())
            .collect();
        assert_eq!(serials, ["VC-0000", "VC-0001", "VC-0002"]);

        let selected = system.select(devices).unwrap();
        assert_eq!(selected.info().serial_number, "VC-0000");
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut system = system_appearing_after(0);
        let err = acquire_device(&mut system, budget(0), |_| {}).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(system.attempts(), 0);
    }

    #[test]
    fn reports_every_second_waited() {
        let mut system = system_appearing_after(u32::MAX);
        let mut events = Vec::new();
        let budget = RetryBudget {
            max_attempts: 2,
            wait_secs: 1,
        };

        let err = acquire_device(&mut system, budget, |event| events.push(event)).unwrap_err();

        assert!(matches!(err, Error::DeviceNotFound { attempts: 2 }));
        assert_eq!(
            events,
            [
                AcquireEvent::Waiting {
                    attempt: 1,
                    max_attempts: 2,
                    wait_secs: 1
                },
                AcquireEvent::Tick {
                    attempt: 1,
                    elapsed_secs: 1
                },
            ]
        );
    }
}

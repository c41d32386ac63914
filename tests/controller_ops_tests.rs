use rinnai_control::simulator::{SimulatedHeater, SimulatedTransport};
use rinnai_control::{ControllerConfig, DeviceCommand, DeviceError, HeaterController, PowerOutcome};
use std::net::IpAddr;
use std::sync::Arc;

fn own_ip() -> IpAddr {
    IpAddr::from([10, 0, 0, 2])
}

fn setup(heater: SimulatedHeater) -> (HeaterController<Arc<SimulatedTransport>>, Arc<SimulatedTransport>) {
    let transport = Arc::new(SimulatedTransport::new(heater, own_ip()));
    let controller = HeaterController::new(
        Arc::clone(&transport),
        ControllerConfig::new("simulated", own_ip()),
    );
    (controller, transport)
}

#[cfg(test)]
mod power_tests {
    use super::*;

    #[tokio::test]
    async fn test_power_already_in_requested_state() {
        let (controller, transport) = setup(SimulatedHeater::new(40));

        let outcome = controller.set_power_state(true).await.unwrap();
        assert!(matches!(outcome, PowerOutcome::Unchanged(_)));
        assert!(outcome.state().is_powered_on);
        assert_eq!(transport.commands().await, vec![DeviceCommand::ReadState]);
    }

    #[tokio::test]
    async fn test_power_toggles_when_different() {
        let (controller, transport) = setup(SimulatedHeater::new(40));

        let outcome = controller.set_power_state(false).await.unwrap();
        assert!(matches!(outcome, PowerOutcome::Toggled(_)));
        assert!(!outcome.state().is_powered_on);
        assert_eq!(
            transport.commands().await,
            vec![DeviceCommand::ReadState, DeviceCommand::TogglePower]
        );
        assert!(!transport.heater().await.is_powered_on());

        // and back on again
        let outcome = controller.set_power_state(true).await.unwrap();
        assert!(outcome.state().is_powered_on);
    }

    #[tokio::test]
    async fn test_power_surfaces_transport_errors() {
        let (controller, transport) = setup(SimulatedHeater::new(40));
        transport.fail_next(1).await;

        let result = controller.set_power_state(false).await;
        assert!(matches!(result, Err(DeviceError::Transport(_))));
        assert!(transport.heater().await.is_powered_on());
    }
}

#[cfg(test)]
mod button_tests {
    use super::*;

    #[tokio::test]
    async fn test_button_claims_and_releases_priority() {
        let (controller, transport) = setup(SimulatedHeater::new(40));

        let state = controller.press_button("banho").await.unwrap();
        assert_eq!(state.priority_holder, Some(own_ip()));

        assert_eq!(
            transport.commands().await,
            vec![
                DeviceCommand::SetPriority(Some(own_ip())),
                DeviceCommand::Button("banho".to_string()),
                DeviceCommand::SetPriority(None),
            ]
        );
        let heater = transport.heater().await;
        assert_eq!(heater.last_button(), Some("banho"));
        assert_eq!(heater.priority_holder(), None);
    }

    #[tokio::test]
    async fn test_button_releases_priority_even_when_the_press_fails() {
        let (controller, transport) = setup(SimulatedHeater::new(40));
        transport.malform_next(2).await;

        assert!(controller.press_button("banho").await.is_err());
        assert_eq!(transport.commands().await.last(), Some(&DeviceCommand::SetPriority(None)));
        assert!(!controller.is_busy());
    }
}

#[cfg(test)]
mod arbiter_tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_and_release() {
        let (controller, transport) = setup(SimulatedHeater::new(40));

        assert!(controller.arbiter().claim_priority(true).await);
        assert_eq!(transport.heater().await.priority_holder(), Some(own_ip()));

        assert!(controller.arbiter().claim_priority(false).await);
        assert_eq!(transport.heater().await.priority_holder(), None);
    }

    #[tokio::test]
    async fn test_claim_failure_is_not_fatal() {
        let (controller, transport) = setup(SimulatedHeater::new(40));
        transport.fail_next(1).await;

        assert!(!controller.arbiter().claim_priority(true).await);
        assert!(controller.arbiter().claim_priority(true).await);
    }

    #[test]
    fn test_foreign_detection() {
        let (controller, _transport) = setup(SimulatedHeater::new(40));
        let arbiter = controller.arbiter();

        assert!(!arbiter.is_foreign(None));
        assert!(!arbiter.is_foreign(Some(own_ip())));
        assert!(arbiter.is_foreign(Some(IpAddr::from([10, 0, 0, 3]))));
    }
}

#[cfg(test)]
mod telemetry_tests {
    use super::*;

    #[tokio::test]
    async fn test_parameters_and_consumption() {
        let mut heater = SimulatedHeater::new(48);
        heater.set_water_flowing(true);
        heater.run_for(3600);
        let (controller, transport) = setup(heater);

        let params = controller.get_parameters().await.unwrap();
        assert_eq!(params.target_temperature, 48);
        assert_eq!(params.outlet_temperature, 48.0);
        assert_eq!(params.power_kw, 22.93);
        assert_eq!(params.ip_address, "192.168.0.40");

        let consumption = controller.get_consumption().await.unwrap();
        assert_eq!(consumption.working_time_secs, 3600);
        let heater = transport.heater().await;
        assert_eq!(consumption.water_m3, (heater.water_m3() * 100.0).round() / 100.0);
        assert_eq!(consumption.gas_m3, (heater.gas_m3() * 100.0).round() / 100.0);

        // reads never claim priority
        assert_eq!(
            transport.commands().await,
            vec![DeviceCommand::ReadParameters, DeviceCommand::ReadConsumption]
        );
    }

    #[tokio::test]
    async fn test_state_read() {
        let (controller, _transport) = setup(SimulatedHeater::new(55));

        let state = controller.get_state().await.unwrap();
        assert_eq!(state.target_temperature, 55);
        assert!(state.is_powered_on);
        assert!(!state.is_heating);
    }
}

//! End-to-end tests driving sessions through the controller.

#[cfg(test)]
mod tests {
    use crate::activator::ServiceConfig;
    use crate::config::PipelineConfig;
    use crate::controller::PipelineController;
    use crate::core::{PipelineStage, ProgressEventType, StepStatus};
    use crate::errors::{ErrorKind, ProvisionError, SequencerError, StateError};
    use crate::events::{
        noop_sink, ChannelProgressSink, CollectingProgressSink, FanoutProgressSink, NoOpProgressSink,
    };
    use crate::probe::{ConnectionInput, ConnectivityResult, HostFacts};
    use crate::sequencer::StepDefinition;
    use crate::session::RetryConfig;
    use crate::testing::{
        assert_stage_failed_at, assert_stage_succeeded, InMemoryCatalog, ScriptedBackend,
        ScriptedStep, StaticPlans, StaticProbe,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn frankfurt() -> ConnectivityResult {
        ConnectivityResult::reachable(
            HostFacts::new()
                .with_operating_system("Ubuntu 22.04")
                .with_region("Frankfurt")
                .with_provider("Hetzner"),
        )
    }

    fn input() -> ConnectionInput {
        ConnectionInput::new("203.0.113.5", "hunter2")
    }

    struct Harness {
        controller: PipelineController,
        probe: Arc<StaticProbe>,
        backend: Arc<ScriptedBackend>,
        catalog: Arc<InMemoryCatalog>,
    }

    fn harness(backend: ScriptedBackend) -> Harness {
        let probe = Arc::new(StaticProbe::new(frankfurt()));
        let backend = Arc::new(backend);
        let catalog = Arc::new(InMemoryCatalog::new());
        let controller = PipelineController::new(probe.clone(), backend.clone(), catalog.clone());
        Harness {
            controller,
            probe,
            backend,
            catalog,
        }
    }

    async fn advance_to_configure(controller: &PipelineController) -> crate::core::SessionId {
        let id = controller.begin_session().unwrap();
        controller.submit_connection(id, input()).await.unwrap();
        controller.run_deployment(id, noop_sink()).await.unwrap();
        controller.run_testing(id, noop_sink()).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_frankfurt_onboarding_end_to_end() {
        let h = harness(ScriptedBackend::new());
        let id = h.controller.begin_session().unwrap();

        let report = h.controller.submit_connection(id, input()).await.unwrap();
        assert!(report.result.success);
        assert_eq!(report.stage, PipelineStage::Deploy);
        let facts = report.result.facts.unwrap();
        assert_eq!(facts.country.as_deref(), Some("Germany"));
        assert_eq!(facts.city.as_deref(), Some("Frankfurt"));

        let deploy_sink = Arc::new(CollectingProgressSink::new());
        let deployment = h.controller.run_deployment(id, deploy_sink.clone()).await.unwrap();
        assert_stage_succeeded(&deployment);
        assert_eq!(deployment.steps.len(), 3);
        // start, one log line and finish per step
        assert_eq!(deploy_sink.len(), 9);
        assert_eq!(h.controller.snapshot(id).unwrap().stage, PipelineStage::Test);

        let testing = h
            .controller
            .run_testing(id, Arc::new(NoOpProgressSink))
            .await
            .unwrap();
        assert_stage_succeeded(&testing);
        assert_eq!(testing.steps.len(), 4);
        assert!(testing.steps.iter().all(|s| s.status == StepStatus::Passed));
        assert_eq!(h.controller.snapshot(id).unwrap().stage, PipelineStage::Configure);

        let record = h
            .controller
            .submit_service_config(id, ServiceConfig::new("Premium DE", 9.0, 90.0, 10))
            .await
            .unwrap();
        assert_eq!(record.session_id, id);
        assert_eq!(record.host.address, "203.0.113.5");
        assert_eq!(record.config.name, "Premium DE");
        assert_eq!(h.catalog.len(), 1);

        let snapshot = h.controller.snapshot(id).unwrap();
        assert_eq!(snapshot.stage, PipelineStage::Done);
        assert_eq!(snapshot.offering.map(|o| o.offering_id), Some(record.offering_id));
        assert_eq!(
            h.backend.executed(),
            vec![
                "install_packages",
                "configure_server",
                "start_service",
                "connectivity",
                "handshake",
                "dns_resolution",
                "throughput",
            ]
        );

        let closed = h.controller.close(id).unwrap();
        assert!(closed.is_done());
        assert_eq!(h.controller.session_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_connection_input_skips_probe() {
        let h = harness(ScriptedBackend::new());
        let id = h.controller.begin_session().unwrap();

        for bad in [ConnectionInput::new("", "secret"), ConnectionInput::new("203.0.113.5", "")] {
            let err = h.controller.submit_connection(id, bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Input);
        }

        assert_eq!(h.probe.calls(), 0);
        let snapshot = h.controller.snapshot(id).unwrap();
        assert_eq!(snapshot.stage, PipelineStage::Connect);
        assert_eq!(snapshot.attempts_for(PipelineStage::Connect), 0);
    }

    #[tokio::test]
    async fn test_unreachable_host_stays_in_connect() {
        let probe = Arc::new(StaticProbe::new(frankfurt()).then(ConnectivityResult::unreachable(
            "authentication failed",
        )));
        let controller = PipelineController::new(
            probe.clone(),
            Arc::new(ScriptedBackend::new()),
            Arc::new(InMemoryCatalog::new()),
        );
        let id = controller.begin_session().unwrap();

        let report = controller.submit_connection(id, input()).await.unwrap();
        assert!(!report.result.success);
        assert_eq!(report.stage, PipelineStage::Connect);
        let snapshot = controller.snapshot(id).unwrap();
        assert_eq!(
            snapshot.last_failure.map(|f| f.error),
            Some("authentication failed".to_string())
        );
        assert!(snapshot.retry_after_ms.is_some());

        let report = controller.submit_connection(id, input()).await.unwrap();
        assert_eq!(report.stage, PipelineStage::Deploy);
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn test_run_testing_in_deploy_is_state_error() {
        let h = harness(ScriptedBackend::new());
        let id = h.controller.begin_session().unwrap();
        h.controller.submit_connection(id, input()).await.unwrap();

        let err = h
            .controller
            .run_testing(id, Arc::new(NoOpProgressSink))
            .await
            .unwrap_err();

        assert!(err.is_protocol_error());
        assert!(matches!(
            err,
            ProvisionError::State(StateError::WrongStage {
                expected: PipelineStage::Test,
                actual: PipelineStage::Deploy,
                ..
            })
        ));
        assert!(h.backend.executed().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_retry_reruns_from_first_step() {
        let backend = ScriptedBackend::new().with_script(
            "configure_server",
            ScriptedStep::fail_before_attempt(2, "wg-quick: config invalid"),
        );
        let h = harness(backend);
        let id = h.controller.begin_session().unwrap();
        h.controller.submit_connection(id, input()).await.unwrap();

        let first = h
            .controller
            .run_deployment(id, Arc::new(NoOpProgressSink))
            .await
            .unwrap();
        assert_stage_failed_at(&first, "configure_server");
        assert_eq!(first.error.as_deref(), Some("wg-quick: config invalid"));
        assert_eq!(h.controller.snapshot(id).unwrap().stage, PipelineStage::Deploy);

        let second = h
            .controller
            .run_deployment(id, Arc::new(NoOpProgressSink))
            .await
            .unwrap();
        assert_stage_succeeded(&second);
        assert_eq!(second.attempt, 2);
        assert_eq!(
            h.backend.executed(),
            vec![
                "install_packages",
                "configure_server",
                "install_packages",
                "configure_server",
                "start_service",
            ]
        );

        let snapshot = h.controller.snapshot(id).unwrap();
        assert_eq!(snapshot.stage, PipelineStage::Test);
        assert_eq!(snapshot.attempts_for(PipelineStage::Deploy), 2);
        assert!(snapshot.last_failure.is_none());
    }

    #[tokio::test]
    async fn test_retry_limit_then_abandon() {
        let probe = Arc::new(StaticProbe::new(ConnectivityResult::unreachable("timeout")));
        let controller = PipelineController::new(
            probe,
            Arc::new(ScriptedBackend::new()),
            Arc::new(InMemoryCatalog::new()),
        )
        .with_config(PipelineConfig::new().with_retry(RetryConfig::new().with_max_attempts(2)));
        let id = controller.begin_session().unwrap();

        controller.submit_connection(id, input()).await.unwrap();
        controller.submit_connection(id, input()).await.unwrap();
        let err = controller.submit_connection(id, input()).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::State(StateError::RetryLimitExceeded { attempts: 2, .. })
        ));

        let last = controller.abandon(id, "host unreachable").await.unwrap();
        assert!(last.abandoned);
        assert!(matches!(
            controller.snapshot(id).unwrap_err(),
            StateError::UnknownSession(_)
        ));
    }

    #[tokio::test]
    async fn test_service_config_validation() {
        let h = harness(ScriptedBackend::new());
        let id = advance_to_configure(&h.controller).await;

        let err = h
            .controller
            .submit_service_config(id, ServiceConfig::new("Budget", 0.0, 90.0, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        let snapshot = h.controller.snapshot(id).unwrap();
        assert_eq!(snapshot.stage, PipelineStage::Configure);
        assert_eq!(snapshot.attempts_for(PipelineStage::Configure), 0);
        assert!(h.catalog.is_empty());

        let record = h
            .controller
            .submit_service_config(id, ServiceConfig::new("Budget", 9.99, 99.99, 5))
            .await
            .unwrap();
        assert_eq!(record.host.address, "203.0.113.5");
        assert_eq!(h.controller.snapshot(id).unwrap().stage, PipelineStage::Done);
    }

    #[tokio::test]
    async fn test_activation_failure_keeps_prior_results() {
        let h = harness(ScriptedBackend::new());
        let id = advance_to_configure(&h.controller).await;
        h.catalog.reject_next("catalog unavailable");

        let err = h
            .controller
            .submit_service_config(id, ServiceConfig::new("Premium DE", 9.0, 90.0, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Activation);

        let snapshot = h.controller.snapshot(id).unwrap();
        assert_eq!(snapshot.stage, PipelineStage::Configure);
        assert!(snapshot.deployment.unwrap().is_success());
        assert!(snapshot.testing.unwrap().is_success());
        assert!(snapshot.last_failure.is_some());

        h.controller
            .submit_service_config(id, ServiceConfig::new("Premium DE", 9.0, 90.0, 10))
            .await
            .unwrap();
        assert_eq!(h.catalog.len(), 1);
    }

    #[tokio::test]
    async fn test_busy_session_rejects_second_operation_and_exposes_progress() {
        let slow = ScriptedStep::succeed()
            .with_logs(["apt-get install wireguard"])
            .with_delay(Duration::from_millis(300));
        let plans = StaticPlans::new(
            vec![
                StepDefinition::new("install_packages", "Install VPN packages", Arc::new(slow)),
                StepDefinition::new("start_service", "Start VPN service", Arc::new(ScriptedStep::succeed())),
            ],
            vec![StepDefinition::new("connectivity", "Connectivity check", Arc::new(ScriptedStep::succeed()))],
        );
        let h = harness(ScriptedBackend::new());
        let controller = h.controller.with_plans(Arc::new(plans));
        let id = controller.begin_session().unwrap();
        controller.submit_connection(id, input()).await.unwrap();

        let running = controller.run_deployment(id, Arc::new(NoOpProgressSink));
        let observer = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let snapshot = controller.snapshot(id).unwrap();
            let second = controller.run_deployment(id, Arc::new(NoOpProgressSink)).await;
            (snapshot, second)
        };
        let (result, (snapshot, second)) = tokio::join!(running, observer);

        assert!(result.unwrap().is_success());
        assert!(snapshot.is_busy());
        let live = snapshot.deployment.unwrap();
        assert!(live.is_running());
        assert_eq!(live.steps[0].status, StepStatus::Running);
        assert_eq!(live.steps[0].logs, vec!["apt-get install wireguard".to_string()]);
        assert!(live.steps[1].is_pending());

        let err = second.unwrap_err();
        assert!(matches!(err, ProvisionError::State(StateError::Busy { .. })));
        assert_eq!(controller.snapshot(id).unwrap().attempts_for(PipelineStage::Deploy), 1);
    }

    #[tokio::test]
    async fn test_abandon_waits_for_running_step() {
        let first = ScriptedStep::succeed().with_delay(Duration::from_millis(200));
        let second = ScriptedStep::succeed();
        let plans = StaticPlans::new(
            vec![
                StepDefinition::new("install_packages", "Install VPN packages", Arc::new(first)),
                StepDefinition::new("start_service", "Start VPN service", Arc::new(second.clone())),
            ],
            vec![],
        );
        let h = harness(ScriptedBackend::new());
        let controller = h.controller.with_plans(Arc::new(plans));
        let id = controller.begin_session().unwrap();
        controller.submit_connection(id, input()).await.unwrap();

        let running = controller.run_deployment(id, Arc::new(NoOpProgressSink));
        let abandon = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            controller.abandon(id, "seller cancelled").await
        };
        let (result, last) = tokio::join!(running, abandon);

        let result = result.unwrap();
        assert_eq!(result.steps[0].status, StepStatus::Completed);
        assert!(result.steps[1].is_pending());
        assert_eq!(result.error.as_deref(), Some("abandoned"));
        assert_eq!(second.calls(), 0);

        let last = last.unwrap();
        assert!(last.abandoned);
        assert!(!last.is_busy());
        assert_eq!(last.deployment.unwrap().error.as_deref(), Some("abandoned"));
        assert_eq!(controller.session_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_sink_receives_ordered_events() {
        let h = harness(ScriptedBackend::new());
        let id = h.controller.begin_session().unwrap();
        h.controller.submit_connection(id, input()).await.unwrap();

        let (sink, mut rx) = ChannelProgressSink::new();
        let collector = Arc::new(CollectingProgressSink::new());
        let fanout = FanoutProgressSink::new()
            .with_sink(Arc::new(sink))
            .with_sink(collector.clone());
        h.controller.run_deployment(id, Arc::new(fanout)).await.unwrap();

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push((event.sequence, event.step_id().to_string(), event.event_type));
        }
        assert_eq!(received.len(), 9);
        assert_eq!(collector.len(), 9);
        assert_eq!(
            received[..3],
            [
                (0, "install_packages".to_string(), ProgressEventType::StepStarted),
                (1, "install_packages".to_string(), ProgressEventType::StepLog),
                (2, "install_packages".to_string(), ProgressEventType::StepFinished),
            ]
        );
    }

    #[tokio::test]
    async fn test_suggested_config_prefills_location() {
        let h = harness(ScriptedBackend::new());
        let id = h.controller.begin_session().unwrap();
        assert!(h.controller.suggested_config(id).is_err());

        h.controller.submit_connection(id, input()).await.unwrap();
        let draft = h.controller.suggested_config(id).unwrap();
        assert_eq!(draft.country.as_deref(), Some("Germany"));
        assert_eq!(draft.city.as_deref(), Some("Frankfurt"));
    }

    #[tokio::test]
    async fn test_session_limit_and_close_rules() {
        let h = harness(ScriptedBackend::new());
        let controller = h
            .controller
            .with_config(PipelineConfig::new().with_max_sessions(1));

        let id = controller.begin_session().unwrap();
        assert_eq!(controller.session_ids(), vec![id]);
        assert_eq!(
            controller.begin_session().unwrap_err(),
            StateError::SessionLimit { max: 1 }
        );
        assert!(matches!(
            controller.close(id).unwrap_err(),
            StateError::WrongStage { .. }
        ));

        controller.abandon(id, "changed mind").await.unwrap();
        assert!(controller.session_ids().is_empty());
        let next = controller.begin_session().unwrap();
        assert_eq!(controller.session_ids(), vec![next]);
    }

    #[tokio::test]
    async fn test_malformed_plan_leaves_session_untouched() {
        let step = || Arc::new(ScriptedStep::succeed());
        let plans = StaticPlans::new(
            vec![
                StepDefinition::new("install_packages", "Install", step()),
                StepDefinition::new("install_packages", "Install again", step()),
            ],
            vec![],
        );
        let h = harness(ScriptedBackend::new());
        let controller = h.controller.with_plans(Arc::new(plans));
        let id = controller.begin_session().unwrap();
        controller.submit_connection(id, input()).await.unwrap();

        let err = controller.run_deployment(id, noop_sink()).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Sequencer(SequencerError::DuplicateStep(ref step_id)) if step_id == "install_packages"
        ));

        let snapshot = controller.snapshot(id).unwrap();
        assert_eq!(snapshot.stage, PipelineStage::Deploy);
        assert!(!snapshot.is_busy());
        assert_eq!(snapshot.attempts_for(PipelineStage::Deploy), 0);
        assert!(snapshot.deployment.is_none());
        assert!(snapshot.last_failure.is_none());
    }

    #[tokio::test]
    async fn test_abandoning_completed_session_rejected() {
        let h = harness(ScriptedBackend::new());
        let id = advance_to_configure(&h.controller).await;
        h.controller
            .submit_service_config(id, ServiceConfig::new("Premium DE", 9.0, 90.0, 10))
            .await
            .unwrap();

        assert_eq!(
            h.controller.abandon(id, "late").await.unwrap_err(),
            StateError::Completed
        );
    }
}

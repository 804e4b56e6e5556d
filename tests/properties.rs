//! Registry and orchestrator invariants over random start/stop sequences

mod common;

use std::collections::HashSet;

use common::harness;
use local_kube::ports::SERVICE_PORT_RANGE;
use local_kube::{AppSpec, Application, Error, Registry};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Start { name: String, port: u16 },
    Stop(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        ("[a-z]{1,6}", 8000u16..8008).prop_map(|(name, port)| Op::Start { name, port }),
        (-2i64..10).prop_map(Op::Stop),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_lifecycle_invariants(ops in prop::collection::vec(op(), 1..40)) {
        let h = harness();

        for op in ops {
            match op {
                Op::Start { name, port } => {
                    let raw = format!("{}:{}", name, port);
                    let port_in_use = h.registry.find_by_app_port(port).is_some();
                    match h.orch.start(&raw) {
                        Ok(app) => {
                            prop_assert!(!port_in_use);
                            prop_assert_eq!(h.registry.find_by_id(i64::from(app.id())), Some(app));
                        }
                        Err(e) => {
                            prop_assert!(port_in_use, "unexpected start failure: {}", e);
                            let is_attach_failure = matches!(e, Error::ListenerAttachFailed { .. });
                            prop_assert!(is_attach_failure);
                        }
                    }
                }
                Op::Stop(id) => {
                    let before = h.registry.find_by_id(id);
                    match h.orch.stop(id) {
                        Ok(stopped) => {
                            let expected = before.unwrap();
                            prop_assert!(expected.same_deployment(&stopped));
                            prop_assert!(h.registry.find_by_id(id).is_none());
                        }
                        Err(Error::InvalidArgument(_)) => {
                            prop_assert!(id <= 0);
                        }
                        Err(Error::NotFound(_)) => {
                            prop_assert!(before.is_none());
                        }
                        Err(e) => {
                            prop_assert!(false, "unexpected stop failure: {}", e);
                        }
                    }
                }
            }

            let apps = h.registry.snapshot();
            let ids: HashSet<u32> = apps.iter().map(Application::id).collect();
            prop_assert_eq!(ids.len(), apps.len());
            prop_assert!(ids.iter().all(|id| *id > 0));

            let service_ports: HashSet<u16> = apps.iter().map(Application::port_service).collect();
            prop_assert_eq!(service_ports.len(), apps.len());
            prop_assert!(service_ports.iter().all(|p| SERVICE_PORT_RANGE.contains(p)));

            prop_assert_eq!(h.driver.live_count(), apps.len());
            prop_assert_eq!(h.listeners.bound_count(), apps.len());
            prop_assert_eq!(h.registry.next_id(), ids.iter().max().map_or(1, |max| max + 1));
        }

        prop_assert!(h.orch.shutdown().is_empty());
        prop_assert_eq!(h.driver.live_count(), 0);
        prop_assert_eq!(h.listeners.bound_count(), 0);
    }

    #[test]
    fn prop_find_by_id_rejects_non_positive(id in i64::MIN..=0) {
        let registry = Registry::new();
        let app = Application::new(1, &AppSpec::parse("hello:8080").unwrap(), 49152).unwrap();
        registry.insert(Some(app)).unwrap();

        prop_assert!(registry.find_by_id(id).is_none());
    }

    #[test]
    fn prop_null_insert_and_remove_leave_size(count in 0usize..5) {
        let registry = Registry::new();
        for i in 0..count {
            let spec = AppSpec::parse(&format!("app{}:{}", i, 8000 + i)).unwrap();
            registry.insert(Some(Application::new(registry.next_id(), &spec, 49152 + i as u16).unwrap())).unwrap();
        }

        prop_assert!(matches!(registry.insert(None), Err(Error::InvalidArgument(_))));
        prop_assert!(matches!(registry.remove(None), Err(Error::InvalidArgument(_))));
        prop_assert_eq!(registry.size(), count);
    }
}

//! Canonical node identity.
//!
//! Every node in a traffic map is addressed by an ID derived from the
//! telemetry 6-tuple (service namespace, service, workload namespace,
//! workload, app, version) and the requested [`GraphType`]. The same tuple
//! always yields the same ID, which is what lets samples from independent
//! queries, and maps from independent namespaces, be merged by key.
//!
//! | Prefix  | Kind     | Shape                                |
//! |---------|----------|--------------------------------------|
//! | `wl_`   | workload | `wl_<ns>_<workload>`                 |
//! | `vapp_` | app      | `vapp_<ns>_<workload>` or `vapp_<ns>_<app>_<version>` |
//! | `app_`  | app      | `app_<ns>_<app>`                     |
//! | `svc_`  | service  | `svc_<ns>_<service>`                 |
//! | `unknown_source` | unknown | fixed                        |

use crate::types::{GraphType, NodeKind};

/// Placeholder telemetry value for an unidentifiable label.
pub const UNKNOWN: &str = "unknown";

/// ID of the node representing traffic of unknown origin.
pub const UNKNOWN_SOURCE_ID: &str = "unknown_source";

/// Egress sentinel for traffic leaving the mesh unmatched.
pub const PASSTHROUGH_CLUSTER: &str = "PassthroughCluster";

/// Egress sentinel for traffic dropped by the mesh.
pub const BLACK_HOLE_CLUSTER: &str = "BlackHoleCluster";

/// Returns true when a label value is present and meaningful.
#[must_use]
pub fn is_ok(value: &str) -> bool {
    !value.is_empty() && value != UNKNOWN
}

/// Returns true for the mesh's egress sentinel services.
#[must_use]
pub fn is_egress_cluster(service: &str) -> bool {
    service == PASSTHROUGH_CLUSTER || service == BLACK_HOLE_CLUSTER
}

/// The identity tuple of one side of a telemetry sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeKey<'a> {
    /// Namespace of the destination service.
    pub service_namespace: &'a str,
    /// Service name.
    pub service: &'a str,
    /// Namespace of the workload.
    pub workload_namespace: &'a str,
    /// Workload name.
    pub workload: &'a str,
    /// App label value.
    pub app: &'a str,
    /// Version label value.
    pub version: &'a str,
}

impl<'a> NodeKey<'a> {
    /// Key for a workload-side tuple (no service).
    #[must_use]
    pub const fn workload(
        namespace: &'a str,
        workload: &'a str,
        app: &'a str,
        version: &'a str,
    ) -> Self {
        Self {
            service_namespace: namespace,
            service: "",
            workload_namespace: namespace,
            workload,
            app,
            version,
        }
    }

    /// Key for a bare service.
    #[must_use]
    pub const fn service(namespace: &'a str, service: &'a str) -> Self {
        Self {
            service_namespace: namespace,
            service,
            workload_namespace: "",
            workload: "",
            app: "",
            version: "",
        }
    }

    /// The namespace the node belongs to: the workload namespace when
    /// known, otherwise the service namespace.
    #[must_use]
    pub fn namespace(&self) -> &'a str {
        if is_ok(self.workload_namespace) {
            self.workload_namespace
        } else {
            self.service_namespace
        }
    }

    /// Resolves the canonical ID and node kind, or `None` when none of
    /// workload, app and service is known.
    #[must_use]
    pub fn try_id(&self, graph_type: GraphType) -> Option<(String, NodeKind)> {
        let namespace = self.namespace();

        if namespace == UNKNOWN
            && self.workload == UNKNOWN
            && self.app == UNKNOWN
            && self.service.is_empty()
        {
            return Some((UNKNOWN_SOURCE_ID.to_string(), NodeKind::Unknown));
        }

        if self.workload == UNKNOWN && self.app == UNKNOWN && self.service == UNKNOWN {
            return Some((format!("svc_{namespace}_{UNKNOWN}"), NodeKind::Service));
        }

        let workload_ok = is_ok(self.workload);
        let app_ok = is_ok(self.app);
        let service_ok = is_ok(self.service);

        if !workload_ok && !app_ok && !service_ok {
            return None;
        }

        let workload_node = || (format!("wl_{namespace}_{}", self.workload), NodeKind::Workload);
        let service_node = || (format!("svc_{namespace}_{}", self.service), NodeKind::Service);

        match graph_type {
            GraphType::Workload | GraphType::Service => {
                if workload_ok {
                    Some(workload_node())
                } else if service_ok {
                    Some(service_node())
                } else {
                    None
                }
            }
            GraphType::App | GraphType::VersionedApp => {
                if app_ok {
                    if graph_type == GraphType::VersionedApp {
                        if workload_ok {
                            return Some((
                                format!("vapp_{namespace}_{}", self.workload),
                                NodeKind::App,
                            ));
                        }
                        if is_ok(self.version) {
                            return Some((
                                format!("vapp_{namespace}_{}_{}", self.app, self.version),
                                NodeKind::App,
                            ));
                        }
                    }
                    Some((format!("app_{namespace}_{}", self.app), NodeKind::App))
                } else if workload_ok {
                    Some(workload_node())
                } else {
                    Some(service_node())
                }
            }
        }
    }

    /// Resolves the canonical ID and node kind.
    ///
    /// # Panics
    ///
    /// Panics when the tuple cannot identify a node; callers holding raw
    /// telemetry should use [`NodeKey::try_id`].
    #[must_use]
    #[allow(clippy::panic)]
    pub fn id(&self, graph_type: GraphType) -> (String, NodeKind) {
        match self.try_id(graph_type) {
            Some(resolved) => resolved,
            None => panic!(
                "failed identity resolution for {self:?}: no workload, app or service"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn key<'a>(
        svc_ns: &'a str,
        svc: &'a str,
        wl_ns: &'a str,
        wl: &'a str,
        app: &'a str,
        ver: &'a str,
    ) -> NodeKey<'a> {
        NodeKey {
            service_namespace: svc_ns,
            service: svc,
            workload_namespace: wl_ns,
            workload: wl,
            app,
            version: ver,
        }
    }

    // ==================== RULE TESTS ====================

    #[test]
    fn test_unknown_source() {
        let k = key("unknown", "", "unknown", "unknown", "unknown", "unknown");
        let graph_types = [
            GraphType::Workload,
            GraphType::App,
            GraphType::VersionedApp,
            GraphType::Service,
        ];
        for gt in graph_types {
            assert_eq!(k.id(gt), (UNKNOWN_SOURCE_ID.to_string(), NodeKind::Unknown));
        }
    }

    #[test]
    fn test_unknown_service() {
        let k = key("bookinfo", "unknown", "", "unknown", "unknown", "");
        assert_eq!(
            k.id(GraphType::Workload),
            ("svc_bookinfo_unknown".to_string(), NodeKind::Service)
        );
    }

    #[test_case(GraphType::Workload, "wl_bookinfo_reviews-v1", NodeKind::Workload ; "workload graph")]
    #[test_case(GraphType::Service, "wl_bookinfo_reviews-v1", NodeKind::Workload ; "service graph")]
    #[test_case(GraphType::App, "app_bookinfo_reviews", NodeKind::App ; "app graph")]
    #[test_case(GraphType::VersionedApp, "vapp_bookinfo_reviews-v1", NodeKind::App ; "versioned app graph")]
    fn test_full_tuple(graph_type: GraphType, expected_id: &str, expected_kind: NodeKind) {
        let k = key("bookinfo", "reviews", "bookinfo", "reviews-v1", "reviews", "v1");
        assert_eq!(k.id(graph_type), (expected_id.to_string(), expected_kind));
    }

    #[test]
    fn test_versioned_app_without_workload_uses_version() {
        let k = key("bookinfo", "", "bookinfo", "unknown", "reviews", "v2");
        assert_eq!(
            k.id(GraphType::VersionedApp),
            ("vapp_bookinfo_reviews_v2".to_string(), NodeKind::App)
        );
    }

    #[test]
    fn test_versioned_app_without_workload_or_version_falls_back_to_app() {
        let k = key("bookinfo", "", "bookinfo", "unknown", "reviews", "unknown");
        assert_eq!(
            k.id(GraphType::VersionedApp),
            ("app_bookinfo_reviews".to_string(), NodeKind::App)
        );
    }

    #[test]
    fn test_app_graph_without_app_uses_workload_then_service() {
        let wl = key("bookinfo", "", "bookinfo", "ratings-v1", "unknown", "");
        assert_eq!(
            wl.id(GraphType::App),
            ("wl_bookinfo_ratings-v1".to_string(), NodeKind::Workload)
        );

        let svc = NodeKey::service("bookinfo", "ratings");
        assert_eq!(
            svc.id(GraphType::App),
            ("svc_bookinfo_ratings".to_string(), NodeKind::Service)
        );
    }

    #[test]
    fn test_namespace_prefers_workload_namespace() {
        let k = key("istio-system", "details", "bookinfo", "details-v1", "details", "v1");
        assert_eq!(k.namespace(), "bookinfo");
        let k = key("istio-system", "details", "unknown", "unknown", "unknown", "");
        assert_eq!(k.namespace(), "istio-system");
    }

    #[test]
    fn test_workload_graph_with_only_app_is_unresolvable() {
        let k = key("bookinfo", "", "bookinfo", "", "reviews", "v1");
        assert!(k.try_id(GraphType::Workload).is_none());
        assert!(k.try_id(GraphType::App).is_some());
    }

    #[test]
    fn test_try_id_none_when_nothing_known() {
        let k = key("bookinfo", "", "bookinfo", "", "", "");
        assert!(k.try_id(GraphType::Workload).is_none());
        assert!(k.try_id(GraphType::VersionedApp).is_none());
    }

    #[test]
    #[should_panic(expected = "failed identity resolution")]
    fn test_id_panics_on_impossible_tuple() {
        let k = key("bookinfo", "", "bookinfo", "", "", "");
        let _ = k.id(GraphType::Workload);
    }

    #[test]
    fn test_egress_sentinels() {
        assert!(is_egress_cluster(PASSTHROUGH_CLUSTER));
        assert!(is_egress_cluster(BLACK_HOLE_CLUSTER));
        assert!(!is_egress_cluster("reviews"));
    }

    #[test]
    fn test_is_ok() {
        assert!(is_ok("reviews"));
        assert!(!is_ok(""));
        assert!(!is_ok(UNKNOWN));
    }

    // ==================== PROPERTY TESTS ====================

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn label() -> impl Strategy<Value = String> {
            prop_oneof![
                Just(String::new()),
                Just(UNKNOWN.to_string()),
                "[a-z][a-z0-9-]{0,8}",
            ]
        }

        fn graph_type() -> impl Strategy<Value = GraphType> {
            prop_oneof![
                Just(GraphType::Workload),
                Just(GraphType::App),
                Just(GraphType::VersionedApp),
                Just(GraphType::Service),
            ]
        }

        proptest! {
            #[test]
            fn id_is_deterministic(
                svc_ns in label(), svc in label(), wl_ns in label(),
                wl in label(), app in label(), ver in label(), gt in graph_type(),
            ) {
                let k = key(&svc_ns, &svc, &wl_ns, &wl, &app, &ver);
                prop_assert_eq!(k.try_id(gt), k.try_id(gt));
            }

            #[test]
            fn id_prefix_matches_kind(
                svc_ns in label(), svc in label(), wl_ns in label(),
                wl in label(), app in label(), ver in label(), gt in graph_type(),
            ) {
                let k = key(&svc_ns, &svc, &wl_ns, &wl, &app, &ver);
                if let Some((id, kind)) = k.try_id(gt) {
                    let expected = match kind {
                        NodeKind::Workload => id.starts_with("wl_"),
                        NodeKind::App => id.starts_with("app_") || id.starts_with("vapp_"),
                        NodeKind::Service => id.starts_with("svc_"),
                        NodeKind::Unknown => id == UNKNOWN_SOURCE_ID,
                    };
                    prop_assert!(expected, "id {} does not match kind {}", id, kind);
                }
            }

            #[test]
            fn distinct_workloads_get_distinct_ids(
                ns in "[a-z]{1,6}", a in "[a-z]{1,6}", b in "[a-z]{1,6}",
            ) {
                prop_assume!(a != b);
                let ka = NodeKey::workload(&ns, &a, "", "");
                let kb = NodeKey::workload(&ns, &b, "", "");
                prop_assert_ne!(ka.try_id(GraphType::Workload), kb.try_id(GraphType::Workload));
            }
        }
    }
}

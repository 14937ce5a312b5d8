#![forbid(unsafe_code)]

//! Candidate classification into singleton/transient registration groups.
//!
//! Per-candidate markers take priority over the classification policy; a
//! marked candidate never consults it. Service binding picks which of the
//! services a candidate implements it should be registered under, if any.

/// Decision produced by a classification policy for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Skip,
    AsSingleton,
    AsTransient,
}

/// Explicit per-candidate marker, overriding the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Never register, whatever the policy says.
    Skip,
    Singleton,
    Transient,
}

/// How to pick the service a component is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServiceBinding {
    /// Bind to the first service the candidate implements, if any.
    #[default]
    UseAny,
    /// Register the concrete type directly, ignoring implemented services.
    Ignore,
    /// Bind to the named service; falls back to direct registration when
    /// the candidate does not implement it.
    Use(String),
}

/// A concrete type offered for registration.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub module_path: String,
    pub type_name: String,
    /// Service (trait) names this type implements, in declaration order.
    pub implements: Vec<String>,
    pub marker: Option<Marker>,
    pub service: ServiceBinding,
}

impl Candidate {
    pub fn new(module_path: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            type_name: type_name.into(),
            implements: Vec::new(),
            marker: None,
            service: ServiceBinding::default(),
        }
    }

    #[must_use]
    pub fn implements(mut self, services: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.implements.extend(services.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn marked(mut self, marker: Marker) -> Self {
        self.marker = Some(marker);
        self
    }

    #[must_use]
    pub fn bound(mut self, service: ServiceBinding) -> Self {
        self.service = service;
        self
    }

    /// Fully qualified path of the candidate type.
    #[must_use]
    pub fn full_path(&self) -> String {
        format!("{}::{}", self.module_path, self.type_name)
    }
}

/// A classified component ready for registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub module_path: String,
    pub type_name: String,
    /// Service to register under; `None` means register the concrete type
    /// directly.
    pub service: Option<String>,
}

/// Singleton/transient groupings produced from a candidate set.
#[derive(Debug, Default)]
pub struct ComponentScan {
    singletons: Vec<Component>,
    transients: Vec<Component>,
}

impl ComponentScan {
    /// Classify `candidates`: explicit markers win, unmarked candidates go
    /// through `policy`.
    pub fn analyze(
        candidates: &[Candidate],
        policy: impl Fn(&Candidate) -> Registration,
    ) -> Self {
        let mut scan = Self::default();
        for candidate in candidates {
            let registration = match candidate.marker {
                Some(Marker::Skip) => Registration::Skip,
                Some(Marker::Singleton) => Registration::AsSingleton,
                Some(Marker::Transient) => Registration::AsTransient,
                None => policy(candidate),
            };
            let bucket = match registration {
                Registration::Skip => {
                    tracing::debug!(candidate = %candidate.full_path(), "skipped by classification");
                    continue;
                }
                Registration::AsSingleton => &mut scan.singletons,
                Registration::AsTransient => &mut scan.transients,
            };
            bucket.push(Component {
                module_path: candidate.module_path.clone(),
                type_name: candidate.type_name.clone(),
                service: resolve_service(candidate),
            });
        }
        scan
    }

    /// Classify using markers only; unmarked candidates are skipped.
    pub fn marked_only(candidates: &[Candidate]) -> Self {
        Self::analyze(candidates, |_| Registration::Skip)
    }

    #[must_use]
    pub fn singletons(&self) -> &[Component] {
        &self.singletons
    }

    #[must_use]
    pub fn transients(&self) -> &[Component] {
        &self.transients
    }

    /// All classified components, singletons first.
    #[must_use]
    pub fn components(&self) -> Vec<(&Component, bool)> {
        self.singletons
            .iter()
            .map(|component| (component, true))
            .chain(self.transients.iter().map(|component| (component, false)))
            .collect()
    }

    /// Register every component directly, ignoring service bindings.
    pub fn register(
        &self,
        mut singleton: impl FnMut(&Component),
        mut transient: impl FnMut(&Component),
    ) {
        for component in &self.singletons {
            singleton(component);
        }
        for component in &self.transients {
            transient(component);
        }
    }

    /// Register every component, routing service-bound components through
    /// the service handlers and the rest through the direct ones.
    pub fn register_with_services(
        &self,
        mut singleton_direct: impl FnMut(&Component),
        mut transient_direct: impl FnMut(&Component),
        mut singleton_service: impl FnMut(&Component, &str),
        mut transient_service: impl FnMut(&Component, &str),
    ) {
        for component in &self.singletons {
            match &component.service {
                Some(service) => singleton_service(component, service),
                None => singleton_direct(component),
            }
        }
        for component in &self.transients {
            match &component.service {
                Some(service) => transient_service(component, service),
                None => transient_direct(component),
            }
        }
    }
}

fn resolve_service(candidate: &Candidate) -> Option<String> {
    match &candidate.service {
        ServiceBinding::Ignore => None,
        ServiceBinding::UseAny => candidate.implements.first().cloned(),
        ServiceBinding::Use(name) => candidate
            .implements
            .iter()
            .find(|service| *service == name)
            .cloned(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candidates() -> Vec<Candidate> {
        vec![
            Candidate::new("app::viewmodels", "MainViewModel"),
            Candidate::new("app::services", "Clock").implements(["TimeSource"]),
            Candidate::new("app::services", "Rng").marked(Marker::Transient),
            Candidate::new("app::internal", "Scratch").marked(Marker::Skip),
        ]
    }

    #[test]
    fn policy_classifies_unmarked_candidates() {
        let scan = ComponentScan::analyze(&sample_candidates(), |candidate| {
            if candidate.module_path.starts_with("app::services") {
                Registration::AsSingleton
            } else {
                Registration::AsTransient
            }
        });

        assert_eq!(scan.singletons().len(), 1);
        assert_eq!(scan.singletons()[0].type_name, "Clock");
        // MainViewModel via policy, Rng via its marker.
        assert_eq!(scan.transients().len(), 2);
    }

    #[test]
    fn markers_take_priority_over_policy() {
        let candidates = vec![
            Candidate::new("app", "A").marked(Marker::Singleton),
            Candidate::new("app", "B").marked(Marker::Skip),
        ];
        // A policy that would invert both decisions.
        let scan = ComponentScan::analyze(&candidates, |_| Registration::AsTransient);

        assert_eq!(scan.singletons().len(), 1);
        assert_eq!(scan.singletons()[0].type_name, "A");
        assert!(scan.transients().is_empty());
    }

    #[test]
    fn marked_only_skips_unmarked() {
        let scan = ComponentScan::marked_only(&sample_candidates());
        assert!(scan.singletons().is_empty());
        assert_eq!(scan.transients().len(), 1);
        assert_eq!(scan.transients()[0].type_name, "Rng");
    }

    #[test]
    fn service_binding_modes() {
        let candidates = vec![
            Candidate::new("app", "A").implements(["IA", "IB"]),
            Candidate::new("app", "B")
                .implements(["IA", "IB"])
                .bound(ServiceBinding::Use("IB".to_string())),
            Candidate::new("app", "C")
                .implements(["IA"])
                .bound(ServiceBinding::Ignore),
            Candidate::new("app", "D")
                .implements(["IA"])
                .bound(ServiceBinding::Use("Missing".to_string())),
        ];
        let scan = ComponentScan::analyze(&candidates, |_| Registration::AsSingleton);

        let services: Vec<Option<String>> = scan
            .singletons()
            .iter()
            .map(|component| component.service.clone())
            .collect();
        assert_eq!(
            services,
            vec![
                Some("IA".to_string()),
                Some("IB".to_string()),
                None,
                // Named service not implemented: registered directly.
                None,
            ]
        );
    }

    #[test]
    fn registration_handlers_receive_grouped_components() {
        let candidates = vec![
            Candidate::new("app", "S").marked(Marker::Singleton),
            Candidate::new("app", "T")
                .implements(["IT"])
                .marked(Marker::Transient),
        ];
        let scan = ComponentScan::marked_only(&candidates);

        let direct = std::cell::RefCell::new(Vec::new());
        let bound = std::cell::RefCell::new(Vec::new());
        scan.register_with_services(
            |component| direct.borrow_mut().push(format!("s:{}", component.type_name)),
            |component| direct.borrow_mut().push(format!("t:{}", component.type_name)),
            |component, service| {
                bound
                    .borrow_mut()
                    .push(format!("s:{}:{}", component.type_name, service))
            },
            |component, service| {
                bound
                    .borrow_mut()
                    .push(format!("t:{}:{}", component.type_name, service))
            },
        );

        assert_eq!(direct.into_inner(), vec!["s:S".to_string()]);
        assert_eq!(bound.into_inner(), vec!["t:T:IT".to_string()]);
    }

    #[test]
    fn components_lists_singletons_first() {
        let candidates = vec![
            Candidate::new("app", "T").marked(Marker::Transient),
            Candidate::new("app", "S").marked(Marker::Singleton),
        ];
        let scan = ComponentScan::marked_only(&candidates);
        let listed: Vec<(String, bool)> = scan
            .components()
            .into_iter()
            .map(|(component, singleton)| (component.type_name.clone(), singleton))
            .collect();
        assert_eq!(
            listed,
            vec![("S".to_string(), true), ("T".to_string(), false)]
        );
    }
}

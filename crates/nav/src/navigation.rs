//! Navigation graph
//!
//! Destinations are registered against entity classes and looked up along the
//! class linearization of the entity being navigated, so subclasses inherit
//! (and may shadow) the destinations of their bases.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::appliance::Appliance;
use crate::error::{NavError, NavResult, NavigationError};
use crate::implementation::Implementation;
use crate::step::{NavArgs, NavFuture, NavigateStep, TrailEntry};
use crate::stepper::Stepper;
use crate::view::ViewRef;

/// A class of entities; declare as a `static` so bases can refer to it
pub struct EntityClass {
    pub name: &'static str,
    pub bases: &'static [&'static EntityClass],
}

impl EntityClass {
    pub const fn new(name: &'static str, bases: &'static [&'static EntityClass]) -> Self {
        Self { name, bases }
    }

    /// Linearization used for destination lookup, most specific first
    ///
    /// C3 when the hierarchy admits one, depth-first otherwise.
    pub fn mro(&'static self) -> Vec<&'static EntityClass> {
        c3(self).unwrap_or_else(|| {
            debug!("No C3 linearization for {}, using depth-first order", self.name);
            let mut out = Vec::new();
            depth_first(self, &mut out);
            out
        })
    }

    pub fn is_subclass_of(&'static self, other: &EntityClass) -> bool {
        self.mro().iter().any(|c| c.name == other.name)
    }
}

impl fmt::Debug for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityClass({})", self.name)
    }
}

fn same(a: &EntityClass, b: &EntityClass) -> bool {
    std::ptr::eq(a, b) || a.name == b.name
}

fn c3(class: &'static EntityClass) -> Option<Vec<&'static EntityClass>> {
    let mut seqs = class
        .bases
        .iter()
        .map(|base| c3(base))
        .collect::<Option<Vec<_>>>()?;
    seqs.push(class.bases.to_vec());

    let mut result = vec![class];
    loop {
        seqs.retain(|s| !s.is_empty());
        if seqs.is_empty() {
            return Some(result);
        }

        let head = seqs
            .iter()
            .map(|s| s[0])
            .find(|candidate| {
                !seqs
                    .iter()
                    .any(|s| s[1..].iter().any(|c| same(c, candidate)))
            })?;

        result.push(head);
        for seq in seqs.iter_mut() {
            if same(seq[0], head) {
                seq.remove(0);
            }
        }
    }
}

fn depth_first(class: &'static EntityClass, out: &mut Vec<&'static EntityClass>) {
    if out.iter().any(|c| same(c, class)) {
        return;
    }
    out.push(class);
    for base in class.bases {
        depth_first(base, out);
    }
}

/// Domain object a navigation is about
pub trait Entity: Send + Sync + 'static {
    fn entity_class(&self) -> &'static EntityClass;

    fn appliance(&self) -> Arc<Appliance>;

    fn parent(&self) -> Option<EntityRef> {
        None
    }

    /// Named related object, used by attribute prerequisites
    fn attribute(&self, name: &str) -> Option<EntityRef> {
        match name {
            "parent" => self.parent(),
            _ => None,
        }
    }

    fn as_any(&self) -> &dyn Any;
}

pub type EntityRef = Arc<dyn Entity>;

/// Identity of an entity instance
pub fn entity_key(obj: &EntityRef) -> usize {
    Arc::as_ptr(obj) as *const () as usize
}

struct Registration {
    class: &'static EntityClass,
    step: Arc<dyn NavigateStep>,
}

/// Registry of `(entity class, destination) -> step`
///
/// Filled at startup, read-only afterwards.
#[derive(Default)]
pub struct Navigate {
    steps: HashMap<(&'static str, String), Registration>,
}

impl Navigate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `step` on `class`; `name` defaults to the step's type name
    pub fn register<S: NavigateStep + 'static>(
        &mut self,
        class: &'static EntityClass,
        name: Option<&str>,
        step: S,
    ) -> NavResult<()> {
        let name = name.map(String::from).unwrap_or_else(short_type_name::<S>);
        let key = (class.name, name);
        if self.steps.contains_key(&key) {
            return Err(NavError::DuplicateDestination {
                class: class.name.to_string(),
                name: key.1,
            });
        }
        debug!("Registered destination {}/{}", class.name, key.1);
        self.steps.insert(
            key,
            Registration {
                class,
                step: Arc::new(step),
            },
        );
        Ok(())
    }

    /// First class along the linearization of `class` that registers `name`
    pub fn resolve(
        &self,
        class: &'static EntityClass,
        name: &str,
    ) -> Option<(&'static EntityClass, Arc<dyn NavigateStep>)> {
        class.mro().into_iter().find_map(|c| {
            self.steps
                .get(&(c.name, name.to_string()))
                .map(|r| (r.class, r.step.clone()))
        })
    }

    /// Every `(class, destination)` pair, sorted
    pub fn destinations(&self) -> Vec<(&'static str, String)> {
        let mut all: Vec<_> = self
            .steps
            .keys()
            .map(|(class, name)| (*class, name.clone()))
            .collect();
        all.sort();
        all
    }

    /// Destinations reachable from instances of `class`, sorted
    pub fn destinations_for(&self, class: &'static EntityClass) -> Vec<String> {
        let mro = class.mro();
        let mut names: Vec<String> = self
            .steps
            .keys()
            .filter(|(owner, _)| mro.iter().any(|c| c.name == *owner))
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn navigate(
        &self,
        implementation: &Arc<Implementation>,
        obj: EntityRef,
        name: &str,
        args: NavArgs,
    ) -> NavResult<Option<ViewRef>> {
        self.navigate_with_trail(implementation, obj, name, args, Vec::new())
            .await
    }

    pub(crate) fn navigate_with_trail<'a>(
        &'a self,
        implementation: &'a Arc<Implementation>,
        obj: EntityRef,
        name: &'a str,
        args: NavArgs,
        trail: Vec<TrailEntry>,
    ) -> NavFuture<'a> {
        Box::pin(async move {
            let class = obj.entity_class();
            let (_, step) = self
                .resolve(class, name)
                .ok_or_else(|| NavigationError::unresolved(name, class.name))?;

            let entry = TrailEntry::new(&obj, name);
            if trail.contains(&entry) {
                let mut names: Vec<String> = trail.iter().map(|e| e.to_string()).collect();
                names.push(entry.to_string());
                return Err(NavigationError::cycle(name, class.name, names).into());
            }

            Stepper::new(implementation.clone(), obj, name, step, trail)
                .go(&args)
                .await
        })
    }
}

fn short_type_name<S>() -> String {
    let full = std::any::type_name::<S>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    static OBJECT: EntityClass = EntityClass::new("Object", &[]);
    static A: EntityClass = EntityClass::new("A", &[&OBJECT]);
    static B: EntityClass = EntityClass::new("B", &[&A]);
    static C: EntityClass = EntityClass::new("C", &[&B]);

    static X: EntityClass = EntityClass::new("X", &[&OBJECT]);
    static Y: EntityClass = EntityClass::new("Y", &[&OBJECT]);
    static XY: EntityClass = EntityClass::new("XY", &[&X, &Y]);
    static YX: EntityClass = EntityClass::new("YX", &[&Y, &X]);
    static BAD: EntityClass = EntityClass::new("Bad", &[&XY, &YX]);

    fn names(mro: Vec<&'static EntityClass>) -> Vec<&'static str> {
        mro.into_iter().map(|c| c.name).collect()
    }

    #[test]
    fn test_linear_chain() {
        assert_eq!(names(C.mro()), vec!["C", "B", "A", "Object"]);
    }

    #[test]
    fn test_diamond_uses_c3() {
        assert_eq!(names(XY.mro()), vec!["XY", "X", "Y", "Object"]);
    }

    #[test]
    fn test_inconsistent_hierarchy_falls_back_to_depth_first() {
        assert_eq!(
            names(BAD.mro()),
            vec!["Bad", "XY", "X", "Object", "Y", "YX"]
        );
    }

    #[test]
    fn test_is_subclass_of() {
        assert!(C.is_subclass_of(&A));
        assert!(!A.is_subclass_of(&C));
    }

    struct SomeStep;

    #[async_trait::async_trait]
    impl NavigateStep for SomeStep {}

    #[test]
    fn test_register_defaults_to_type_name_and_rejects_duplicates() {
        let mut nav = Navigate::new();
        nav.register(&A, None, SomeStep).unwrap();
        assert_eq!(nav.destinations(), vec![("A", "SomeStep".to_string())]);

        let err = nav.register(&A, Some("SomeStep"), SomeStep).unwrap_err();
        assert!(matches!(err, NavError::DuplicateDestination { .. }));

        nav.register(&B, Some("SomeStep"), SomeStep).unwrap();
        assert_eq!(nav.len(), 2);
    }

    #[test]
    fn test_resolve_walks_mro() {
        let mut nav = Navigate::new();
        nav.register(&A, Some("D"), SomeStep).unwrap();
        let (owner, _) = nav.resolve(&C, "D").unwrap();
        assert_eq!(owner.name, "A");

        nav.register(&B, Some("D"), SomeStep).unwrap();
        let (owner, _) = nav.resolve(&C, "D").unwrap();
        assert_eq!(owner.name, "B");

        assert!(nav.resolve(&X, "D").is_none());
        assert_eq!(nav.destinations_for(&C), vec!["D".to_string()]);
    }
}

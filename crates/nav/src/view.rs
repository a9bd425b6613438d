//! View framework
//!
//! A view is a typed surface over part of a page. Building one never touches
//! the DOM; widgets look their elements up lazily and cache them until
//! `flush_widget_cache`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::browser::Browser;
use crate::driver::Locator;
use crate::error::{NavError, NavResult};
use crate::navigation::EntityRef;

/// Data a view is parametrized with
#[derive(Clone, Default)]
pub struct ViewContext {
    pub object: Option<EntityRef>,
    pub extra: Map<String, Value>,
}

impl ViewContext {
    pub fn for_object(object: EntityRef) -> Self {
        Self {
            object: Some(object),
            extra: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn object(&self) -> Option<&EntityRef> {
        self.object.as_ref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

impl fmt::Debug for ViewContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewContext")
            .field(
                "object",
                &self.object.as_ref().map(|o| o.entity_class().name),
            )
            .field("extra", &self.extra)
            .finish()
    }
}

/// What every view is built from
#[derive(Clone)]
pub struct ViewBase {
    browser: Weak<Browser>,
    context: ViewContext,
    root: Option<Locator>,
}

impl ViewBase {
    pub fn new(browser: Weak<Browser>, context: ViewContext) -> Self {
        Self {
            browser,
            context,
            root: None,
        }
    }

    /// Base for a nested view under `root`, sharing this context
    pub fn nested(&self, root: impl Into<Locator>) -> Self {
        Self {
            browser: self.browser.clone(),
            context: self.context.clone(),
            root: Some(root.into()),
        }
    }

    pub fn browser(&self) -> NavResult<Arc<Browser>> {
        self.browser.upgrade().ok_or(NavError::BrowserClosed)
    }

    pub fn context(&self) -> &ViewContext {
        &self.context
    }

    pub fn root(&self) -> Option<&Locator> {
        self.root.as_ref()
    }

    /// Fill `{key}` placeholders from the context's extra values
    pub fn locator(&self, template: &str) -> Locator {
        let mut out = template.to_string();
        for (key, value) in &self.context.extra {
            let needle = format!("{{{}}}", key);
            if out.contains(&needle) {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out = out.replace(&needle, &text);
            }
        }
        Locator::parse(&out)
    }
}

#[async_trait]
pub trait View: Send + Sync {
    fn name(&self) -> &'static str;

    fn base(&self) -> &ViewBase;

    fn context(&self) -> &ViewContext {
        self.base().context()
    }

    /// Pure read of the page; false when anything it needs is missing
    async fn is_displayed(&self) -> bool;

    fn flush_widget_cache(&self) {}

    fn as_any(&self) -> &dyn Any;
}

/// A view that can be built by [`Browser::create_view`]
pub trait ViewClass: View + Sized + 'static {
    fn new(base: ViewBase) -> Self;
}

pub type ViewRef = Arc<dyn View>;

impl fmt::Debug for dyn View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.name())
            .field("context", self.context())
            .finish()
    }
}

/// Type-erased view constructor, used as a destination's view
pub type ViewFactory = fn(ViewBase) -> ViewRef;

fn build<V: ViewClass>(base: ViewBase) -> ViewRef {
    Arc::new(V::new(base))
}

pub fn view_factory<V: ViewClass>() -> ViewFactory {
    build::<V>
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_substitutes_context() {
        let base = ViewBase::new(
            Weak::new(),
            ViewContext::default().with("name", "Datastore").with("idx", 2),
        );
        assert_eq!(
            base.locator("//li[normalize-space(.)='{name}'][{idx}]"),
            Locator::xpath("//li[normalize-space(.)='Datastore'][2]")
        );
        assert_eq!(base.locator("#{missing}"), Locator::css("#{missing}"));
    }

    #[test]
    fn test_nested_keeps_context() {
        let base = ViewBase::new(Weak::new(), ViewContext::default().with("k", "v"));
        let nested = base.nested("div#main");
        assert_eq!(nested.root(), Some(&Locator::css("div#main")));
        assert_eq!(nested.context().get("k"), Some(&Value::from("v")));
        assert!(matches!(nested.browser(), Err(NavError::BrowserClosed)));
    }
}

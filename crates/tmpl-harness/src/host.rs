#![forbid(unsafe_code)]

//! In-memory host runtime.
//!
//! [`TestComponent`] stores whatever a controller registers and replays it
//! on [`mount`](TestComponent::mount) / [`destroy`](TestComponent::destroy)
//! in registration order, like a host templating runtime would. Hooks run
//! untracked so an enclosing computation never picks up their reads.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use tmpl_controller::{
    ComponentDefinition, ComponentInstance, ControllerError, Data, DomEvent, DomHandle,
    EventHandler, EventMap, HelperMap, HelperValue, HostRuntime, LifecycleHook, Result,
};
use tmpl_reactive::untracked;

#[derive(Default)]
pub struct TestHost {
    components: RefCell<IndexMap<String, Rc<TestComponent>>>,
}

impl TestHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component definition named `name`.
    ///
    /// Defining an existing name returns the existing definition.
    pub fn define(&self, name: &str) -> Rc<TestComponent> {
        self.components
            .borrow_mut()
            .entry(name.to_owned())
            .or_insert_with(|| Rc::new(TestComponent::new(name)))
            .clone()
    }

    #[must_use]
    pub fn component(&self, name: &str) -> Option<Rc<TestComponent>> {
        self.components.borrow().get(name).cloned()
    }
}

impl HostRuntime for TestHost {
    fn resolve_component(&self, name: &str) -> Option<Rc<dyn ComponentDefinition>> {
        let component = self.component(name)?;
        Some(component)
    }
}

#[derive(Default)]
pub struct TestComponent {
    name: String,
    created: RefCell<Vec<LifecycleHook>>,
    rendered: RefCell<Vec<LifecycleHook>>,
    destroyed: RefCell<Vec<LifecycleHook>>,
    helpers: RefCell<HelperMap>,
    events: RefCell<EventMap>,
}

impl TestComponent {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create an instance, run the created hooks, then the rendered hooks.
    ///
    /// Stops at the first failing hook.
    pub fn mount(&self, data: Option<Data>, dom: Rc<dyn DomHandle>) -> Result<ComponentInstance> {
        let mut instance = ComponentInstance::new(self.name.clone(), dom);
        if let Some(data) = data {
            instance = instance.with_data(data);
        }
        run_hooks(&self.created, &instance)?;
        run_hooks(&self.rendered, &instance)?;
        tracing::trace!(message = "harness.mounted", template = %self.name);
        Ok(instance)
    }

    /// Run the destroyed hooks in registration order.
    pub fn destroy(&self, instance: &ComponentInstance) -> Result<()> {
        run_hooks(&self.destroyed, instance)
    }

    /// Call a registered helper; `None` if no helper has that name.
    #[must_use]
    pub fn call_helper(
        &self,
        instance: &ComponentInstance,
        name: &str,
        args: &[Value],
    ) -> Option<HelperValue> {
        let helper = self.helpers.borrow().get(name).cloned()?;
        Some(helper(instance, args))
    }

    /// Deliver `event` to the handler registered for `selector`.
    pub fn fire(
        &self,
        instance: &ComponentInstance,
        selector: &str,
        event: &DomEvent,
    ) -> Result<()> {
        let handler: EventHandler = self
            .events
            .borrow()
            .get(selector)
            .cloned()
            .ok_or_else(|| ControllerError::hook(format!("no handler for `{selector}`")))?;
        handler(instance, event)
    }

    #[must_use]
    pub fn helper_names(&self) -> Vec<String> {
        self.helpers.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn event_selectors(&self) -> Vec<String> {
        self.events.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn created_hooks(&self) -> usize {
        self.created.borrow().len()
    }

    #[must_use]
    pub fn rendered_hooks(&self) -> usize {
        self.rendered.borrow().len()
    }

    #[must_use]
    pub fn destroyed_hooks(&self) -> usize {
        self.destroyed.borrow().len()
    }

    /// Whether nothing at all has been registered.
    #[must_use]
    pub fn is_untouched(&self) -> bool {
        self.created_hooks() == 0
            && self.rendered_hooks() == 0
            && self.destroyed_hooks() == 0
            && self.helpers.borrow().is_empty()
            && self.events.borrow().is_empty()
    }
}

fn run_hooks(hooks: &RefCell<Vec<LifecycleHook>>, instance: &ComponentInstance) -> Result<()> {
    let hooks = hooks.borrow().clone();
    untracked(|| hooks.iter().try_for_each(|hook| hook(instance)))
}

impl ComponentDefinition for TestComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_created(&self, hook: LifecycleHook) {
        self.created.borrow_mut().push(hook);
    }

    fn on_rendered(&self, hook: LifecycleHook) {
        self.rendered.borrow_mut().push(hook);
    }

    fn on_destroyed(&self, hook: LifecycleHook) {
        self.destroyed.borrow_mut().push(hook);
    }

    fn register_helpers(&self, helpers: HelperMap) {
        self.helpers.borrow_mut().extend(helpers);
    }

    fn register_events(&self, events: EventMap) {
        self.events.borrow_mut().extend(events);
    }
}

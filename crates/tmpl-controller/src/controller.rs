#![forbid(unsafe_code)]

//! Controller assembly.
//!
//! [`create_controller`] turns one [`ComponentConfiguration`] into hooks,
//! helpers, and event handlers registered on a host component definition.
//!
//! # Registration order
//!
//! 1. Created hook (built-in): state container, pass-through members,
//!    private members, trigger map, props container plus reconciler.
//! 2. Helpers: built-in `state` and `props`, then user helpers.
//! 3. Event handlers.
//! 4. User `onCreated`, `onRendered`, `onDestroyed`.
//! 5. Destroyed hook (built-in): stops the instance's computations.
//!
//! # Failure Modes
//!
//! - Unknown component name: `TemplateNotFoundError`, before anything is
//!   registered.
//! - `props` without a validator: `PropertyValidatorRequired`, before
//!   anything is registered.
//! - Calling twice for the same component registers everything twice. This
//!   is not guarded; create one controller per component.

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use tmpl_reactive::ReactiveObject;

use crate::config::{ComponentConfiguration, Member};
use crate::error::{ControllerError, Result};
use crate::host::{
    ComponentDefinition, EventHandler, EventMap, Helper, HelperMap, HelperValue, HostRuntime,
    LifecycleHook,
};
use crate::instance::ComponentInstance;
use crate::options::ControllerOptions;
use crate::reconcile::PropertyReconciler;
use crate::validator::{CleanConfiguration, PropsConfig};

const BUILTIN_HELPERS: [&str; 2] = ["state", "props"];

/// Wire `config` into the host component registered as `name`.
pub fn create_controller(
    host: &dyn HostRuntime,
    name: &str,
    config: ComponentConfiguration,
    options: &ControllerOptions,
) -> Result<()> {
    let definition = host
        .resolve_component(name)
        .ok_or_else(|| ControllerError::TemplateNotFound {
            name: name.to_owned(),
        })?;

    if let Some(props) = &config.props {
        if props.validator().is_none() {
            return Err(ControllerError::PropertyValidatorRequired {
                template: name.to_owned(),
            });
        }
    }

    let ComponentConfiguration {
        state,
        props,
        helpers,
        events,
        on_created,
        on_rendered,
        on_destroyed,
        private,
        trigger,
        members,
    } = config;

    let helper_count = helpers.len();
    let event_count = events.len();

    definition.on_created(created_hook(CreatedParts {
        state,
        props,
        private,
        trigger,
        members,
        options: options.clone(),
    }));

    definition.register_helpers(bind_helpers(builtin_helpers(), helpers));

    if !events.is_empty() {
        definition.register_events(bind_events(events));
    }

    if let Some(hook) = on_created {
        definition.on_created(hook);
    }
    if let Some(hook) = on_rendered {
        definition.on_rendered(hook);
    }
    if let Some(hook) = on_destroyed {
        definition.on_destroyed(hook);
    }
    definition.on_destroyed(Rc::new(|instance: &ComponentInstance| -> Result<()> {
        instance.destroy();
        Ok(())
    }));

    tracing::debug!(
        message = "controller.created",
        template = definition.name(),
        helpers = helper_count,
        events = event_count
    );
    Ok(())
}

/// Sections the built-in created hook applies to every new instance.
struct CreatedParts {
    state: Option<IndexMap<String, Value>>,
    props: Option<PropsConfig>,
    private: Option<IndexMap<String, Member>>,
    trigger: Option<IndexMap<String, String>>,
    members: IndexMap<String, Member>,
    options: ControllerOptions,
}

fn created_hook(parts: CreatedParts) -> LifecycleHook {
    let equality = parts.options.change_detection.equality();
    Rc::new(move |instance: &ComponentInstance| -> Result<()> {
        if let Some(defaults) = &parts.state {
            let state = ReactiveObject::with_equality(equality);
            state.add_properties(defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
            instance.install_state(state);
        }

        for (name, member) in &parts.members {
            instance.attach_member(name, member.clone());
        }
        if let Some(private) = &parts.private {
            for (name, member) in private {
                instance.attach_member(name, member.clone());
            }
        }

        if let Some(trigger) = &parts.trigger {
            instance.install_triggers(trigger.clone());
        }

        if let Some(props) = &parts.props {
            let container = ReactiveObject::with_equality(equality);
            instance.install_props(container.clone());
            let clean = effective_clean(props, &parts.options);
            let reconciler = PropertyReconciler::for_instance(
                instance,
                props.validator().cloned(),
                clean,
                container,
            );
            instance.autorun(move |_| reconciler.reconcile().map(|_| ()))?;
        }

        tracing::debug!(message = "controller.instance.created", template = instance.name());
        Ok(())
    })
}

fn effective_clean(props: &PropsConfig, options: &ControllerOptions) -> CleanConfiguration {
    props
        .clean_override()
        .cloned()
        .unwrap_or_else(|| options.clean.clone())
}

fn builtin_helpers() -> HelperMap {
    let state: Helper = Rc::new(|instance: &ComponentInstance, _: &[Value]| {
        HelperValue::from(instance.state())
    });
    let props: Helper = Rc::new(|instance: &ComponentInstance, _: &[Value]| {
        HelperValue::from(instance.props())
    });
    IndexMap::from([("state".to_owned(), state), ("props".to_owned(), props)])
}

/// Built-ins first; user helpers cannot replace them.
fn bind_helpers(builtins: HelperMap, user: HelperMap) -> HelperMap {
    let mut bound = HelperMap::new();
    for (name, helper) in builtins {
        bound.insert(name.clone(), bind_helper(name, helper));
    }
    for (name, helper) in user {
        if BUILTIN_HELPERS.contains(&name.as_str()) {
            tracing::warn!(message = "controller.helper.reserved", helper = %name);
            continue;
        }
        bound.insert(name.clone(), bind_helper(name, helper));
    }
    bound
}

fn bind_helper(name: String, helper: Helper) -> Helper {
    Rc::new(move |instance: &ComponentInstance, args: &[Value]| {
        let _span = tracing::trace_span!("helper", template = instance.name(), helper = %name)
            .entered();
        helper(instance, args)
    })
}

fn bind_events(events: EventMap) -> EventMap {
    events
        .into_iter()
        .map(|(selector, handler)| {
            let key = selector.clone();
            let bound: EventHandler =
                Rc::new(move |instance: &ComponentInstance, event: &crate::host::DomEvent| {
                    let _span = tracing::trace_span!(
                        "event",
                        template = instance.name(),
                        selector = %selector,
                        kind = %event.kind
                    )
                    .entered();
                    handler(instance, event)
                });
            (key, bound)
        })
        .collect()
}

/// Creates controllers against one host with shared options.
///
/// Replaces a process-wide default clean configuration: each factory carries
/// its own, and changing it only affects controllers created afterwards.
pub struct TemplateControllers<H> {
    host: H,
    options: ControllerOptions,
}

impl<H: HostRuntime> TemplateControllers<H> {
    #[must_use]
    pub fn new(host: H) -> Self {
        Self::with_options(host, ControllerOptions::default())
    }

    #[must_use]
    pub fn with_options(host: H, options: ControllerOptions) -> Self {
        Self { host, options }
    }

    #[must_use]
    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Clean configuration for controllers created from now on.
    pub fn set_default_clean_configuration(&mut self, clean: CleanConfiguration) {
        tracing::debug!(message = "controller.clean_configuration.set", clean = ?clean);
        self.options.clean = clean;
    }

    /// [`create_controller`] with this factory's host and options.
    pub fn create(&self, name: &str, config: ComponentConfiguration) -> Result<()> {
        create_controller(&self.host, name, config, &self.options)
    }
}

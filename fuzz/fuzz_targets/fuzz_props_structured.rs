#![no_main]

use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::{Value, json};
use tmpl_controller::{ComponentConfiguration, Data, PropsConfig, TemplateControllers};
use tmpl_harness::{FieldKind, SchemaValidator, TestDom, TestHost};

const KEYS: [&str; 3] = ["title", "count", "open"];

#[derive(Arbitrary, Debug)]
enum FuzzValue {
    Null,
    Bool(bool),
    Int(i32),
    Text(String),
    List(Vec<i8>),
}

impl FuzzValue {
    fn to_json(&self) -> Value {
        match self {
            FuzzValue::Null => Value::Null,
            FuzzValue::Bool(b) => json!(b),
            FuzzValue::Int(n) => json!(n),
            FuzzValue::Text(s) => json!(s),
            FuzzValue::List(items) => json!(items),
        }
    }
}

#[derive(Arbitrary, Debug)]
enum FuzzStep {
    SetData(Vec<(u8, FuzzValue)>),
    ClearData,
    Destroy,
}

fuzz_target!(|steps: Vec<FuzzStep>| {
    let schema = SchemaValidator::new()
        .field("title", FieldKind::String)
        .optional("count", FieldKind::Integer)
        .with_default("open", FieldKind::Boolean, json!(false));
    let controllers = TemplateControllers::new(TestHost::new());
    let card = controllers.host().define("card");
    if controllers
        .create(
            "card",
            ComponentConfiguration::new().props(PropsConfig::new(schema)),
        )
        .is_err()
    {
        return;
    }
    let mut seed = Data::new();
    seed.insert("title".to_owned(), json!("seed"));
    let Ok(instance) = card.mount(Some(seed), Rc::new(TestDom::single(1))) else {
        return;
    };
    let props = instance.props();

    for step in steps.into_iter().take(64) {
        match step {
            FuzzStep::SetData(entries) => {
                let mut data = Data::new();
                for (k, v) in entries {
                    data.insert(KEYS[usize::from(k) % KEYS.len()].to_owned(), v.to_json());
                }
                let _ = instance.set_data(Some(data));
            }
            FuzzStep::ClearData => {
                let _ = instance.set_data(None);
            }
            FuzzStep::Destroy => {
                let _ = card.destroy(&instance);
            }
        }
        if let Some(props) = &props {
            assert!(props.keys().iter().all(|k| KEYS.contains(&k.as_str())));
        }
    }
});

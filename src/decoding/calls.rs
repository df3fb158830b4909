//! Tagged call model and composite-wrapper capability checks.

use serde_json::Value;

use crate::constants::sections;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CallDecodeError {
    #[error("call value is not an object")]
    NotAnObject,
    #[error("call value is missing `{0}`")]
    MissingField(&'static str),
}

/// A decoded call, `{section, method, args}`.
///
/// Arguments keep their JSON form; wrapper kinds know which argument
/// slots hold inner calls, so nothing else probes `args` ad hoc.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub section: String,
    pub method: String,
    pub args: Value,
}

impl Call {
    pub fn decode(value: &Value) -> Result<Self, CallDecodeError> {
        let obj = value.as_object().ok_or(CallDecodeError::NotAnObject)?;
        let section = obj
            .get("section")
            .and_then(Value::as_str)
            .ok_or(CallDecodeError::MissingField("section"))?;
        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .ok_or(CallDecodeError::MissingField("method"))?;
        Ok(Self {
            section: section.to_owned(),
            method: method.to_owned(),
            args: obj.get("args").cloned().unwrap_or(Value::Null),
        })
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.as_object().and_then(|args| args.get(name))
    }

    /// Canonical JSON form, as persisted.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "section": self.section,
            "method": self.method,
            "args": self.args,
        })
    }
}

/// Recognized composite wrappers holding further calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    /// Ordered list of inner calls in the `calls` argument.
    Batch,
    /// Exactly one opaque inner call in the `call` argument.
    Multisig,
    /// Exactly one inner call in the `call` argument.
    Proxy,
}

impl Wrapper {
    pub fn detect(call: &Call) -> Option<Self> {
        match (call.section.as_str(), call.method.as_str()) {
            (sections::UTILITY, "batch" | "batchAll" | "forceBatch") => Some(Self::Batch),
            (sections::MULTISIG, "asMulti" | "asMultiThreshold1") => Some(Self::Multisig),
            (sections::PROXY, "proxy" | "proxyAnnounced") => Some(Self::Proxy),
            _ => None,
        }
    }

    /// Raw inner-call values at this wrapper's argument slot(s), in order.
    ///
    /// Values are undecoded; a malformed entry surfaces as a decode
    /// failure at the node that holds it, not here.
    pub fn inner_values<'a>(&self, call: &'a Call) -> Vec<&'a Value> {
        match self {
            Self::Batch => call
                .arg("calls")
                .and_then(Value::as_array)
                .map(|calls| calls.iter().collect())
                .unwrap_or_default(),
            Self::Multisig | Self::Proxy => call.arg("call").into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn batch(calls: Vec<Value>) -> Value {
        json!({"section": "utility", "method": "batch", "args": {"calls": calls}})
    }

    #[test]
    fn decodes_plain_call() {
        let call = Call::decode(&json!({
            "section": "balances",
            "method": "transfer",
            "args": {"dest": "alice", "value": "10"},
        }))
        .unwrap();
        assert_eq!(call.section, "balances");
        assert_eq!(call.method, "transfer");
        assert_eq!(call.arg("dest"), Some(&json!("alice")));
    }

    #[test]
    fn rejects_malformed_values() {
        assert_eq!(Call::decode(&json!("0xdead")), Err(CallDecodeError::NotAnObject));
        assert_eq!(
            Call::decode(&json!({"method": "transfer"})),
            Err(CallDecodeError::MissingField("section"))
        );
    }

    #[test]
    fn detects_wrappers() {
        let call = Call::decode(&batch(vec![])).unwrap();
        assert_eq!(Wrapper::detect(&call), Some(Wrapper::Batch));

        let call = Call::decode(&json!({
            "section": "proxy", "method": "proxy", "args": {"call": {}},
        }))
        .unwrap();
        assert_eq!(Wrapper::detect(&call), Some(Wrapper::Proxy));

        let call = Call::decode(&json!({
            "section": "balances", "method": "transfer", "args": {},
        }))
        .unwrap();
        assert_eq!(Wrapper::detect(&call), None);
    }

    #[test]
    fn batch_inner_values_keep_order() {
        let a = json!({"section": "s", "method": "a", "args": {}});
        let b = json!({"section": "s", "method": "b", "args": {}});
        let call = Call::decode(&batch(vec![a.clone(), b.clone()])).unwrap();
        let inner = Wrapper::Batch.inner_values(&call);
        assert_eq!(inner, vec![&a, &b]);
    }

    #[test]
    fn wrapper_with_missing_slot_has_no_inner_values() {
        let call = Call::decode(&json!({
            "section": "multisig", "method": "asMulti", "args": {},
        }))
        .unwrap();
        assert!(Wrapper::Multisig.inner_values(&call).is_empty());
    }
}

use std::collections::HashMap;

use serde_json::Value;

const PAYMENT_ID_KEYS: &[&str] = &["PaymentID", "paymentID", "PaymentId", "paymentId"];
const OPAQUE_KEYS: &[&str] = &["Opaque", "opaque"];
const ORDER_ID_KEYS: &[&str] = &["OrderID", "orderID"];
// `resposneCode` is how the bank spells it on the redirect.
const RESPONSE_CODE_KEYS: &[&str] = &["resposneCode", "ResponseCode", "RespCode"];
const CURRENCY_KEYS: &[&str] = &["currency", "Currency"];
const MESSAGE_KEYS: &[&str] = &["RespMessage", "ResponseMessage"];

/// Normalised view of a redirect query or webhook body.
///
/// Everything except `payment_id` and `opaque` is advisory: the outcome of a payment is
/// always re-read from the bank, never taken from these values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub payment_id: Option<String>,
    pub opaque: Option<String>,
    pub gateway_order_id: Option<String>,
    pub response_code: Option<String>,
    pub currency: Option<String>,
    pub message: Option<String>,
}

impl CallbackParams {
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Self {
        let pick = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| pairs.get(*k))
                .map(|v| v.trim())
                .find(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            payment_id: pick(PAYMENT_ID_KEYS),
            opaque: pick(OPAQUE_KEYS),
            gateway_order_id: pick(ORDER_ID_KEYS),
            response_code: pick(RESPONSE_CODE_KEYS),
            currency: pick(CURRENCY_KEYS),
            message: pick(MESSAGE_KEYS),
        }
    }

    /// Webhook bodies may carry numbers where the redirect carries strings.
    pub fn from_json(body: &Value) -> Self {
        let pick = |keys: &[&str]| keys.iter().filter_map(|k| body.get(*k)).find_map(scalar_string);

        Self {
            payment_id: pick(PAYMENT_ID_KEYS),
            opaque: pick(OPAQUE_KEYS),
            gateway_order_id: pick(ORDER_ID_KEYS),
            response_code: pick(RESPONSE_CODE_KEYS),
            currency: pick(CURRENCY_KEYS),
            message: pick(MESSAGE_KEYS),
        }
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

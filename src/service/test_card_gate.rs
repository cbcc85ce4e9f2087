//! Sandbox guard: only bank-issued test cards may complete a payment in test mode.

use serde::Serialize;

const LAST4_LEN: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCardPolicy {
    pub allowed_last4: Vec<String>,
    pub strict_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCardVerdict {
    pub valid: bool,
    pub message: String,
    pub card_last4: Option<String>,
}

impl TestCardVerdict {
    fn accept(message: impl Into<String>, card_last4: Option<String>) -> Self {
        Self {
            valid: true,
            message: message.into(),
            card_last4,
        }
    }

    fn reject(message: impl Into<String>, card_last4: Option<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            card_last4,
        }
    }
}

pub fn validate_test_card(
    card_number: Option<&str>,
    policy: &TestCardPolicy,
    sandbox: bool,
) -> TestCardVerdict {
    if !sandbox {
        return TestCardVerdict::accept("Production mode - card validation skipped", None);
    }

    if !policy.strict_mode {
        tracing::warn!("test card strict mode disabled, accepting any card in sandbox");
        return TestCardVerdict::accept("Strict mode disabled - card accepted", None);
    }

    let card_number = match card_number.map(str::trim) {
        Some(card) if !card.is_empty() => card,
        _ => return TestCardVerdict::reject("Card number not provided in payment details", None),
    };

    let Some(last4) = extract_last4(card_number) else {
        return TestCardVerdict::reject(format!("Invalid card number format: {card_number}"), None);
    };

    if policy.allowed_last4.is_empty() {
        tracing::warn!("no allowed test cards configured, rejecting sandbox card");
        return TestCardVerdict::reject(
            "No allowed test cards configured. Please configure test cards in admin panel.",
            Some(last4),
        );
    }

    if !policy.allowed_last4.iter().any(|allowed| allowed.trim() == last4) {
        tracing::error!(card_last4 = %last4, allowed = ?policy.allowed_last4, "test card rejected");
        return TestCardVerdict::reject(
            format!(
                "Test card {last4} is not in the allowed list. Only bank-provided test cards are accepted in test mode."
            ),
            Some(last4),
        );
    }

    tracing::info!(card_last4 = %last4, "test card accepted");
    TestCardVerdict::accept(format!("Test card {last4} is valid"), Some(last4))
}

/// Last four digits of a masked PAN such as `****1234` or `408306******1234`, or of a
/// bare `1234`. Separators are ignored; `X`/`x` count as mask characters. An unmasked
/// number longer than four digits is not accepted.
pub fn extract_last4(card_number: &str) -> Option<String> {
    let cleaned: Vec<char> = card_number
        .chars()
        .filter_map(|c| match c {
            '0'..='9' | '*' => Some(c),
            'X' | 'x' => Some('*'),
            _ => None,
        })
        .collect();

    if cleaned.len() < LAST4_LEN {
        return None;
    }

    let (head, tail) = cleaned.split_at(cleaned.len() - LAST4_LEN);
    if !tail.iter().all(char::is_ascii_digit) {
        return None;
    }

    match head.last() {
        None | Some('*') => Some(tail.iter().collect()),
        Some(_) => None,
    }
}

/// Last four of whatever the bank sent, for the payment record. Looser than
/// [`extract_last4`]: mask characters are dropped and the final four characters kept.
pub fn card_last4_for_record(card_number: &str) -> Option<String> {
    let unmasked: Vec<char> = card_number.chars().filter(|c| *c != '*').collect();
    let source: Vec<char> = if unmasked.is_empty() {
        card_number.chars().collect()
    } else {
        unmasked
    };
    if source.is_empty() {
        return None;
    }
    let start = source.len().saturating_sub(LAST4_LEN);
    Some(source[start..].iter().collect())
}

/// Trims, keeps only four-digit entries and drops duplicates, preserving order.
pub fn normalize_test_card_list<I, S>(cards: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for card in cards {
        let card = card.as_ref().trim();
        if card.len() == LAST4_LEN && card.chars().all(|c| c.is_ascii_digit()) && !out.iter().any(|c| c == card) {
            out.push(card.to_string());
        }
    }
    out
}

//! Ordered root-cause rules for failure descriptions. First match wins.

use super::{ConditionScope, FailureCategory};
use regex::Regex;
use std::sync::LazyLock;

fn rule(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("failure rule regex is valid")
}

static RULES: LazyLock<Vec<(Regex, FailureCategory)>> = LazyLock::new(|| {
    vec![
        (
            rule(r"\b(no|missing)\s+workpiece|workpiece\s+(is\s+)?(missing|not\s+(found|available|present|in\s+stock))|out\s+of\s+stock|inventory\s+(is\s+)?empty"),
            FailureCategory::InventoryMissingWorkpiece,
        ),
        (
            rule(r"connection\s+refused|econnrefused|connection\s+(reset|aborted)|network\s+(is\s+)?unreachable|(could\s+not|failed\s+to)\s+connect"),
            FailureCategory::NetworkConnectionRefused,
        ),
        (
            rule(r"light[\s_-]*barrier.*\b(did\s*n[o']t|not|never|failed\s+to)\s+(detect|trigger|register|be\s+interrupted)|light[\s_-]*barrier.*\b(missing|missed|no)\s+detection"),
            FailureCategory::SensorLightBarrierMissingDetection,
        ),
        (
            rule(r"light[\s_-]*barrier.*\b(false|unexpected(ly)?|spurious|erroneous(ly)?|wrongly|should\s+not)\b"),
            FailureCategory::SensorLightBarrierFalseDetection,
        ),
        (
            rule(r"\b(nfc|rfid)\b.*\b(read|scan)\w*.*\b(fail\w*|error|unable|invalid|not)\b|\b(fail\w*|unable|could\s*n[o']t|cannot)\b.*\b(read|scan)\w*.*\b(nfc|rfid|tag)\b|\b(nfc|rfid|tag)\b.*\b(could\s*n[o']t|cannot|can't)\s+(be\s+)?(read|scanned)|\btag\s+(read|scan)\w*\s+(fail\w*|error)|unreadable\s+tag"),
            FailureCategory::IdentificationTagReadFailure,
        ),
        (
            rule(r"not\s+ready|\bbusy\b|\bunavailable\b|not\s+available|\bin\s+use\b"),
            FailureCategory::EquipmentNotReady,
        ),
        (
            rule(r"invalid\s+(parameter|value|argument|input|position|colou?r)|out\s+of\s+range|parameter\s+\S+\s+(is\s+)?invalid|unexpected\s+value"),
            FailureCategory::InvalidParameterValue,
        ),
        (
            rule(r"time[\s_-]?out|timed\s+out|took\s+too\s+long|deadline\s+exceeded|exceeded\s+(the\s+)?(maximum\s+)?(time|duration)"),
            FailureCategory::OperationTimeout,
        ),
    ]
});

static UNSATISFIED_CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    rule(r"condition\w*\s+(is\s+|was\s+)?(not\s+(met|satisfied|fulfilled)|unsatisfied|violated|failed)|unsatisfied\s+condition|(pre|post)condition\w*\s+(check\s+)?fail")
});

static WAREHOUSE_HINT: LazyLock<Regex> =
    LazyLock::new(|| rule(r"\b(hbw|warehouse|storage|rack|shelf|bay)\b"));

static TAG_HINT: LazyLock<Regex> = LazyLock::new(|| rule(r"\b(nfc|rfid|tag)\b"));

/// Map a failure description onto exactly one category.
pub fn classify(description: &str, prefix_chars: usize) -> FailureCategory {
    if let Some((_, category)) = RULES.iter().find(|(re, _)| re.is_match(description)) {
        return category.clone();
    }

    if UNSATISFIED_CONDITION.is_match(description) {
        let scope = if WAREHOUSE_HINT.is_match(description) {
            ConditionScope::Warehouse
        } else if TAG_HINT.is_match(description) {
            ConditionScope::Tag
        } else {
            ConditionScope::General
        };
        return FailureCategory::UnsatisfiedCondition { scope };
    }

    FailureCategory::Unclassified {
        prefix: text_prefix(description, prefix_chars),
    }
}

/// Whitespace-collapsed prefix of at most `chars` characters.
pub fn text_prefix(text: &str, chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(chars).collect::<String>().trim_end().to_string()
}

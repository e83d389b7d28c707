//! Rule-based error classifier.
//!
//! First-match-wins over a declaration-ordered rule table. The table is
//! static at construction — callers who need hot-swappable rules can
//! rebuild an `ErrorClassifier` and atomically swap an `Arc` to it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Transient,
    Permanent,
    Recoverable,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Retry,
    Fallback,
    Degrade,
    FailFast,
    Escalate,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub category: Category,
    pub severity: Severity,
    pub recovery_strategy: Strategy,
    pub rule_name: &'static str,
}

pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    pub classification: fn() -> Classification,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

pub struct ErrorClassifier {
    rules: Vec<Rule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

impl ErrorClassifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The baseline rule set: timeouts, resets, 429, 5xx, 401, 403, 400,
    /// 404, rate-limit, circuit-open, 503, OOM, deadlock.
    pub fn with_default_rules() -> Self {
        Self::new(vec![
            Rule {
                name: "timeout",
                matches: |m| contains_any(m, &["timeout", "timed out"]),
                classification: || Classification {
                    category: Category::Transient,
                    severity: Severity::Medium,
                    recovery_strategy: Strategy::Retry,
                    rule_name: "timeout",
                },
            },
            Rule {
                name: "connection_reset",
                matches: |m| contains_any(m, &["connection reset", "econnreset"]),
                classification: || Classification {
                    category: Category::Transient,
                    severity: Severity::Medium,
                    recovery_strategy: Strategy::Retry,
                    rule_name: "connection_reset",
                },
            },
            Rule {
                name: "http_429",
                matches: |m| contains_any(m, &["429", "too many requests"]),
                classification: || Classification {
                    category: Category::Transient,
                    severity: Severity::Medium,
                    recovery_strategy: Strategy::Retry,
                    rule_name: "http_429",
                },
            },
            Rule {
                name: "http_5xx",
                matches: |m| contains_any(m, &["500", "502", "504", "internal server error", "bad gateway", "gateway timeout"]),
                classification: || Classification {
                    category: Category::Transient,
                    severity: Severity::High,
                    recovery_strategy: Strategy::Retry,
                    rule_name: "http_5xx",
                },
            },
            Rule {
                name: "http_401",
                matches: |m| contains_any(m, &["401", "unauthorized", "unauthenticated"]),
                classification: || Classification {
                    category: Category::Permanent,
                    severity: Severity::High,
                    recovery_strategy: Strategy::Escalate,
                    rule_name: "http_401",
                },
            },
            Rule {
                name: "http_403",
                matches: |m| contains_any(m, &["403", "forbidden"]),
                classification: || Classification {
                    category: Category::Permanent,
                    severity: Severity::High,
                    recovery_strategy: Strategy::FailFast,
                    rule_name: "http_403",
                },
            },
            Rule {
                name: "http_400",
                matches: |m| contains_any(m, &["400", "bad request", "validation"]),
                classification: || Classification {
                    category: Category::Permanent,
                    severity: Severity::Medium,
                    recovery_strategy: Strategy::FailFast,
                    rule_name: "http_400",
                },
            },
            Rule {
                name: "http_404",
                matches: |m| contains_any(m, &["404", "not found"]),
                classification: || Classification {
                    category: Category::Permanent,
                    severity: Severity::Low,
                    recovery_strategy: Strategy::FailFast,
                    rule_name: "http_404",
                },
            },
            Rule {
                name: "rate_limit",
                matches: |m| contains_any(m, &["rate limit", "rate-limit", "ratelimited"]),
                classification: || Classification {
                    category: Category::Transient,
                    severity: Severity::Medium,
                    recovery_strategy: Strategy::Degrade,
                    rule_name: "rate_limit",
                },
            },
            Rule {
                name: "circuit_open",
                matches: |m| contains_any(m, &["circuit open", "circuit breaker"]),
                classification: || Classification {
                    category: Category::Recoverable,
                    severity: Severity::High,
                    recovery_strategy: Strategy::Fallback,
                    rule_name: "circuit_open",
                },
            },
            Rule {
                name: "service_unavailable",
                matches: |m| contains_any(m, &["503", "service unavailable"]),
                classification: || Classification {
                    category: Category::Transient,
                    severity: Severity::High,
                    recovery_strategy: Strategy::Retry,
                    rule_name: "service_unavailable",
                },
            },
            Rule {
                name: "oom",
                matches: |m| contains_any(m, &["out of memory", "oom", "memory exhausted"]),
                classification: || Classification {
                    category: Category::Fatal,
                    severity: Severity::Critical,
                    recovery_strategy: Strategy::Escalate,
                    rule_name: "oom",
                },
            },
            Rule {
                name: "deadlock",
                matches: |m| contains_any(m, &["deadlock"]),
                classification: || Classification {
                    category: Category::Recoverable,
                    severity: Severity::High,
                    recovery_strategy: Strategy::Retry,
                    rule_name: "deadlock",
                },
            },
        ])
    }

    /// First-match-wins; unmatched errors default to PERMANENT/FAIL_FAST/MEDIUM.
    pub fn classify(&self, message: &str) -> Classification {
        for rule in &self.rules {
            if (rule.matches)(message) {
                return (rule.classification)();
            }
        }
        Classification {
            category: Category::Permanent,
            severity: Severity::Medium,
            recovery_strategy: Strategy::FailFast,
            rule_name: "default",
        }
    }
}

//! Metrics definitions for the tenancy core.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CONTEXT_PUSH: MetricDef = MetricDef {
    name: "context.push",
    metric_type: MetricType::Counter,
    description: "Number of tenant descriptors pushed onto a context stack",
};

pub const CONTEXT_POP: MetricDef = MetricDef {
    name: "context.pop",
    metric_type: MetricType::Counter,
    description: "Number of tenant descriptors popped from a context stack",
};

pub const CONTEXT_STACK_MISUSE: MetricDef = MetricDef {
    name: "context.stack_misuse",
    metric_type: MetricType::Counter,
    description: "Unbalanced or out of unit push/pop calls. Any value above zero is a bug",
};

pub const ROUTING_DECISION: MetricDef = MetricDef {
    name: "router.decision",
    metric_type: MetricType::Counter,
    description: "Routing decisions, tagged by operation and data category",
};

pub const ROUTING_HISTORY_EVICTED: MetricDef = MetricDef {
    name: "router.history.evicted",
    metric_type: MetricType::Counter,
    description: "Routing decisions evicted from the full history buffer",
};

pub const TENANTS_REGISTERED: MetricDef = MetricDef {
    name: "bootstrap.tenants",
    metric_type: MetricType::Gauge,
    description: "Number of tenants registered at boot",
};

pub const CONNECTIONS_REGISTERED: MetricDef = MetricDef {
    name: "bootstrap.connections",
    metric_type: MetricType::Gauge,
    description: "Number of connection aliases registered at boot, replicas included",
};

pub const BOOTSTRAP_DURATION: MetricDef = MetricDef {
    name: "bootstrap.duration",
    metric_type: MetricType::Histogram,
    description: "Time to run every bootstrap stage in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CONTEXT_PUSH,
    CONTEXT_POP,
    CONTEXT_STACK_MISUSE,
    ROUTING_DECISION,
    ROUTING_HISTORY_EVICTED,
    TENANTS_REGISTERED,
    CONNECTIONS_REGISTERED,
    BOOTSTRAP_DURATION,
];

//! Metrics definitions for the gateway.

use shared::metrics_defs::{MetricDef, MetricType};

pub const HOSTNAME_CACHE_HIT: MetricDef = MetricDef {
    name: "hostname_cache.hit",
    metric_type: MetricType::Counter,
    description: "Hostname lookups answered from the resolution cache, tagged by result",
};

pub const HOSTNAME_CACHE_MISS: MetricDef = MetricDef {
    name: "hostname_cache.miss",
    metric_type: MetricType::Counter,
    description: "Hostname lookups that went to the tenant registry",
};

pub const REQUEST_REJECTED: MetricDef = MetricDef {
    name: "request.rejected",
    metric_type: MetricType::Counter,
    description: "Requests rejected because no tenant could be resolved, tagged by reason",
};

pub const TASK_CONSUMED: MetricDef = MetricDef {
    name: "task.consumed",
    metric_type: MetricType::Counter,
    description: "Tasks run inside a tenant context, tagged by outcome",
};

pub const ALL_METRICS: &[MetricDef] = &[
    HOSTNAME_CACHE_HIT,
    HOSTNAME_CACHE_MISS,
    REQUEST_REJECTED,
    TASK_CONSUMED,
];

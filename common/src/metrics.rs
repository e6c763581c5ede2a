use metrics::{describe_counter, describe_gauge, gauge};

pub fn component_info_metric(name: &'static str) {
    static NAME: &str = "flarestack_component_info";

    describe_gauge!(NAME, "Basic information about the component");

    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("unknown");
    gauge!(NAME, "component" => name, "version" => version).set(1);
}

pub fn describe_injection_metrics() {
    describe_counter!(
        names::TRIALS_GENERATED,
        "Number of pseudo-experiment datasets generated"
    );
    describe_counter!(
        names::SIGNAL_EVENTS_INJECTED,
        "Number of signal events injected across all trials"
    );
    describe_counter!(
        names::SOURCES_SKIPPED,
        "Number of source injections which contributed no events"
    );
}

pub mod names {
    pub const TRIALS_GENERATED: &str = "flarestack_trials_generated";
    pub const SIGNAL_EVENTS_INJECTED: &str = "flarestack_signal_events_injected";
    pub const SOURCES_SKIPPED: &str = "flarestack_sources_skipped";
}

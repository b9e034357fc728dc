use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` directives are honoured on top of
/// the service's own `info` default.
pub fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    for directive in ["gas_meter_service=info", "gas_meter_core=info"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

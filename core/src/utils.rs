use tracing::{Level, Subscriber};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt::format, layer::SubscriberExt, EnvFilter, FmtSubscriber};

fn env_filter(log_level: Level) -> EnvFilter {
	EnvFilter::new(format!(
		"grandpa_pallet_node={log_level},grandpa_pallet_core={log_level},runtime::grandpa={log_level},warn"
	))
}

pub fn json_subscriber(log_level: Level) -> impl Subscriber + Send + Sync {
	FmtSubscriber::builder()
		.json()
		.with_env_filter(env_filter(log_level))
		.with_span_events(format::FmtSpan::CLOSE)
		.finish()
		.with(ErrorLayer::default())
}

pub fn default_subscriber(log_level: Level) -> impl Subscriber + Send + Sync {
	FmtSubscriber::builder()
		.with_env_filter(env_filter(log_level))
		.with_span_events(format::FmtSpan::CLOSE)
		.finish()
		.with(ErrorLayer::default())
}

pub fn blake2_256(data: &[u8]) -> [u8; 32] {
	sp_core::hashing::blake2_256(data)
}

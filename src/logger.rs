//! Structured logging, ported from substrate-archive's `logger.rs`.
//!
//! Two formats: a colored human-readable console format (direct port of
//! substrate-archive's `ColoredLevelConfig` dispatcher) and a JSON format
//! for production, grounded on `original_source/.../logging.py`'s
//! `JSONFormatter`. Noisy outbound-IO crates are quieted the way the
//! Python source quiets `urllib3`/`httpx`/`neo4j`/`boto3`.

use fern::colors::{Color, ColoredLevelConfig};

use crate::config::Config;

pub fn init(config: &Config) -> Result<(), log::SetLoggerError> {
	let level = config.log_level.parse().unwrap_or(log::LevelFilter::Info);

	let dispatch = if config.log_format == "json" {
		json_dispatch(level)
	} else {
		text_dispatch(level)
	};

	quiet_noisy_crates(dispatch).chain(std::io::stdout()).apply()
}

fn quiet_noisy_crates(dispatch: fern::Dispatch) -> fern::Dispatch {
	dispatch
		.level_for("reqwest", log::LevelFilter::Warn)
		.level_for("sqlx", log::LevelFilter::Warn)
		.level_for("trust_dns_resolver", log::LevelFilter::Warn)
		.level_for("trust_dns_proto", log::LevelFilter::Warn)
		.level_for("rustls", log::LevelFilter::Warn)
		.level_for("hyper", log::LevelFilter::Warn)
}

fn text_dispatch(level: log::LevelFilter) -> fern::Dispatch {
	let colors = ColoredLevelConfig::new()
		.info(Color::Green)
		.warn(Color::Yellow)
		.error(Color::Red)
		.debug(Color::Blue)
		.trace(Color::Magenta);

	fern::Dispatch::new().level(level).format(move |out, message, record| {
		out.finish(format_args!(
			"{} {} {} {}",
			chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
			colors.color(record.level()),
			record.target(),
			message,
		))
	})
}

fn json_dispatch(level: log::LevelFilter) -> fern::Dispatch {
	fern::Dispatch::new().level(level).format(move |out, message, record| {
		let payload = serde_json::json!({
			"timestamp": chrono::Utc::now().to_rfc3339(),
			"level": record.level().to_string(),
			"target": record.target(),
			"message": message.to_string(),
		});
		out.finish(format_args!("{}", payload))
	})
}

use crate::VelocityMode;
use log::info;

pub fn parse_velocity_mode(s: &str) -> VelocityMode {
    match s.to_lowercase().as_str() {
        "b" | "binary" | "zero-one" | "zero_one" => VelocityMode::Binary,
        "v" | "velocity" | "raw" => VelocityMode::Raw,
        other => {
            info!("Unknown velocity mode '{}', defaulting to `binary`..!", other);
            VelocityMode::Binary
        }
    }
}

use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::time::Duration;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.video.idle_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let yaml = r#"
video:
  north_south_source: "assets/north_south.mp4"
  east_west_source: "assets/east_west.mp4"
  idle_delay_ms: 10
detection:
  model_path: "models/yolo11n.onnx"
  confidence_threshold: 0.3
  vehicle_classes: [2, 3, 5, 7]
signal:
  green_secs: 10
  high_traffic_green_secs: 20
  yellow_secs: 3
  high_traffic_threshold: 5.0
  red_low_traffic_secs: 15
  red_high_traffic_secs: 5
server:
  bind_addr: "0.0.0.0:8000"
logging:
  level: "info"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.detection.vehicle_classes, vec![2, 3, 5, 7]);
        assert_eq!(config.signal.yellow_secs, 3);
        assert_eq!(config.idle_delay(), Duration::from_millis(10));
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub video: VideoConfig,
    pub detection: DetectionConfig,
    pub signal: SignalConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub north_south_source: String,
    pub east_west_source: String,
    pub idle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub model_path: String,
    pub confidence_threshold: f32,
    pub vehicle_classes: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub green_secs: u64,
    pub high_traffic_green_secs: u64,
    pub yellow_secs: u64,
    pub high_traffic_threshold: f32,
    pub red_low_traffic_secs: u64,
    pub red_high_traffic_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// One traffic-flow axis through the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    NorthSouth,
    EastWest,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::NorthSouth, Direction::EastWest];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::NorthSouth => Direction::EastWest,
            Direction::EastWest => Direction::NorthSouth,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Direction::NorthSouth => 0,
            Direction::EastWest => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::NorthSouth => "NORTH_SOUTH",
            Direction::EastWest => "EAST_WEST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Green,
    Yellow,
    Red,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Green => "GREEN",
            Phase::Yellow => "YELLOW",
            Phase::Red => "RED",
        }
    }
}

/// RGB pixel data, row-major, 3 bytes per pixel.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

/// Point-in-time aggregate published to the HTTP layer. Replaced wholesale
/// once per pipeline iteration; readers only ever see complete values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficSnapshot {
    pub north_south: usize,
    pub east_west: usize,
    pub total: usize,
    pub current_direction: Direction,
    pub light_state: Phase,
}

impl Default for TrafficSnapshot {
    fn default() -> Self {
        Self {
            north_south: 0,
            east_west: 0,
            total: 0,
            current_direction: Direction::NorthSouth,
            light_state: Phase::Green,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_with_wire_field_names() {
        let snap = TrafficSnapshot {
            north_south: 3,
            east_west: 1,
            total: 4,
            current_direction: Direction::EastWest,
            light_state: Phase::Yellow,
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["north_south"], 3);
        assert_eq!(json["current_direction"], "EAST_WEST");
        assert_eq!(json["light_state"], "YELLOW");
    }

    #[test]
    fn opposite_is_involutive() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
        }
    }
}

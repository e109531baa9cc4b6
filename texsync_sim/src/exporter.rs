//! JSON exporter for replication traces.
//!
//! Exports one record per tick so a run can be inspected or diffed offline.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Tick index
    pub tick: u64,
    
    /// Simulation time in seconds
    pub time_sec: f64,
    
    /// Authority state after the tick
    pub authority: AuthorityFrame,
    
    /// Follower state after the tick
    pub followers: Vec<FollowerFrame>,
    
    /// Events (partitions, resets, etc.)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// Authority frame data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityFrame {
    pub version: u64,
    pub time: f32,
    pub angle: f32,
    pub regenerated: bool,
}

/// Follower frame data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerFrame {
    pub index: usize,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_applied: Option<u64>,
    pub applied: bool,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    /// An informational event.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("info".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,
    
    /// Seed used
    pub seed: u64,
    
    /// Duration in seconds
    pub duration_sec: f64,
    
    /// All frames
    pub frames: Vec<SimFrame>,
    
    /// Final results
    pub passed: bool,
    
    /// Failure message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }
    
    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }
    
    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }
    
    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    fn frame(tick: u64) -> SimFrame {
        SimFrame {
            tick,
            time_sec: (tick + 1) as f64 / 60.0,
            authority: AuthorityFrame {
                version: tick + 1,
                time: (tick + 1) as f32 / 60.0,
                angle: 1.5,
                regenerated: false,
            },
            followers: vec![FollowerFrame {
                index: 0,
                version: tick + 1,
                last_applied: Some(tick + 1),
                applied: true,
            }],
            events: Vec::new(),
        }
    }
    
    #[test]
    fn test_export_tracks_duration() {
        let mut export = SimExport::new("steady", 42);
        export.add_frame(frame(0));
        export.add_frame(frame(59));
        export.finalize(true, None);
        
        assert_eq!(export.frames.len(), 2);
        assert!((export.duration_sec - 1.0).abs() < 1e-9);
        assert!(export.passed);
    }
    
    #[test]
    fn test_json_skips_empty_fields() {
        let mut export = SimExport::new("lossy", 1);
        export.add_frame(frame(3));
        
        let json = serde_json::to_value(&export).unwrap();
        assert!(json.get("failure_reason").is_none());
        assert!(json["frames"][0].get("events").is_none());
        assert_eq!(json["frames"][0]["followers"][0]["last_applied"], 4);
        
        let back: SimExport = serde_json::from_value(json).unwrap();
        assert_eq!(back.frames[0].authority.version, 4);
        assert!(back.frames[0].events.is_empty());
        assert!(back.failure_reason.is_none());
    }
    
    #[test]
    fn test_write_to_file() {
        let path = std::env::temp_dir().join("texsync_export_test.json");
        let path = path.to_string_lossy().to_string();
        
        let mut export = SimExport::new("partition", 9);
        export.frames.push(SimFrame {
            events: vec![SimEvent::info("partitioned follower 0")],
            ..frame(0)
        });
        export.write_to_file(&path).unwrap();
        
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("partitioned follower 0"));
        let _ = std::fs::remove_file(&path);
    }
}

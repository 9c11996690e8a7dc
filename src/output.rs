//! Output layout
//!
//! Outputs have a mode (in pixels), a scale and a logical position. The
//! logical size is the mode divided by the scale. Outputs without a
//! configured position are placed left to right in the order they
//! appeared, and are re-packed whenever a scale changes.

use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::plist::{Dict, Value};
use crate::config::OutputConfig;
use crate::geometry::{Point, Rectangle, Size};
use crate::toolkit::OutputId;

pub const MIN_SCALE: f64 = 0.5;
pub const MAX_SCALE: f64 = 4.0;
/// Step of `OutputMagnify` and `OutputReduce`.
pub const SCALE_STEP: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    id: OutputId,
    name: String,
    mode: Size,
    scale: f64,
    position: Point,
    /// Position came from the configuration or the state file.
    pinned: bool,
}

impl Output {
    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> Size {
        self.mode
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn logical_size(&self) -> Size {
        Size::new(
            (self.mode.width as f64 / self.scale).round() as i32,
            (self.mode.height as f64 / self.scale).round() as i32,
        )
    }

    pub fn geometry(&self) -> Rectangle {
        Rectangle::from_loc_and_size(self.position, self.logical_size())
    }
}

fn clamp_scale(scale: f64) -> f64 {
    // Keep one decimal so repeated steps do not drift.
    ((scale * 10.0).round() / 10.0).clamp(MIN_SCALE, MAX_SCALE)
}

#[derive(Debug, Default)]
pub struct OutputLayout {
    outputs: Vec<Output>,
    /// Per-name scale and position from the configuration.
    configured: BTreeMap<String, OutputConfig>,
}

impl OutputLayout {
    pub fn new(configured: BTreeMap<String, OutputConfig>) -> Self {
        Self {
            outputs: Vec::new(),
            configured,
        }
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn get(&self, id: OutputId) -> Option<&Output> {
        self.outputs.iter().find(|o| o.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Logical geometry of every output, in the order they appeared.
    pub fn geometries(&self) -> Vec<(OutputId, Rectangle)> {
        self.outputs.iter().map(|o| (o.id, o.geometry())).collect()
    }

    pub fn extents(&self) -> Rectangle {
        self.outputs
            .iter()
            .map(Output::geometry)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default()
    }

    pub fn add(&mut self, id: OutputId, name: &str, mode: Size) {
        let configured = self.configured.get(name).copied().unwrap_or_default();
        let output = Output {
            id,
            name: name.to_string(),
            mode,
            scale: clamp_scale(configured.scale),
            position: configured.position.unwrap_or_default(),
            pinned: configured.position.is_some(),
        };
        info!(
            "🖥️ Output {} ({}) {}x{} at scale {}",
            name, id, mode.width, mode.height, output.scale
        );
        self.outputs.push(output);
        self.pack();
    }

    pub fn remove(&mut self, id: OutputId) -> bool {
        let before = self.outputs.len();
        self.outputs.retain(|o| o.id != id);
        if self.outputs.len() == before {
            return false;
        }
        info!("🖥️ Output {} removed", id);
        self.pack();
        true
    }

    /// A new mode for an existing output.
    pub fn set_mode(&mut self, id: OutputId, mode: Size) -> bool {
        let Some(output) = self.outputs.iter_mut().find(|o| o.id == id) else {
            return false;
        };
        output.mode = mode;
        self.pack();
        true
    }

    pub fn set_scale(&mut self, id: OutputId, scale: f64) -> bool {
        let Some(output) = self.outputs.iter_mut().find(|o| o.id == id) else {
            return false;
        };
        let scale = clamp_scale(scale);
        if output.scale == scale {
            return false;
        }
        output.scale = scale;
        self.pack();
        true
    }

    /// Adds `delta` to every output's scale. Returns whether anything
    /// changed.
    pub fn scale_by(&mut self, delta: f64) -> bool {
        let mut changed = false;
        for output in &mut self.outputs {
            let scale = clamp_scale(output.scale + delta);
            if scale != output.scale {
                debug!("{}: scale {} -> {}", output.name, output.scale, scale);
                output.scale = scale;
                changed = true;
            }
        }
        if changed {
            self.pack();
        }
        changed
    }

    pub fn magnify(&mut self) -> bool {
        self.scale_by(SCALE_STEP)
    }

    pub fn reduce(&mut self) -> bool {
        self.scale_by(-SCALE_STEP)
    }

    /// Places unpinned outputs in a row to the right of the pinned ones.
    fn pack(&mut self) {
        let mut x = self
            .outputs
            .iter()
            .filter(|o| o.pinned)
            .map(|o| o.geometry().right())
            .max()
            .unwrap_or(0);
        for output in self.outputs.iter_mut().filter(|o| !o.pinned) {
            output.position = Point::new(x, 0);
            x += output.logical_size().width;
        }
    }

    /// The `Outputs` dictionary as saved to the state file.
    pub fn state(&self) -> Value {
        let outputs: Dict = self
            .outputs
            .iter()
            .map(|output| {
                let mut entry = Dict::new();
                entry.insert("Scale", Value::string(output.scale.to_string()));
                entry.insert(
                    "Position",
                    Value::string(format!("{},{}", output.position.x, output.position.y)),
                );
                (output.name.clone(), Value::Dict(entry))
            })
            .collect();
        let mut root = Dict::new();
        root.insert("Outputs", Value::Dict(outputs));
        Value::Dict(root)
    }

    /// Writes [`state`](Self::state) to `path`.
    pub fn save_state<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, format!("{}\n", self.state()))
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;
        info!("💾 Saved output state to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_output_state;
    use tempfile::tempdir;

    fn id(raw: u64) -> OutputId {
        OutputId::from_raw(raw)
    }

    #[test]
    fn test_outputs_are_packed_left_to_right() {
        let mut layout = OutputLayout::default();
        layout.add(id(1), "eDP-1", Size::new(2560, 1440));
        layout.add(id(2), "HDMI-A-1", Size::new(1920, 1080));
        assert_eq!(
            layout.geometries(),
            vec![
                (id(1), Rectangle::new(0, 0, 2560, 1440)),
                (id(2), Rectangle::new(2560, 0, 1920, 1080)),
            ]
        );
        assert!(layout.set_scale(id(1), 2.0));
        assert_eq!(layout.get(id(2)).unwrap().position(), Point::new(1280, 0));
        assert_eq!(layout.extents(), Rectangle::new(0, 0, 3200, 1080));

        assert!(layout.remove(id(1)));
        assert_eq!(layout.geometries(), vec![(id(2), Rectangle::new(0, 0, 1920, 1080))]);
        assert!(!layout.remove(id(1)));
    }

    #[test]
    fn test_magnify_and_reduce_clamp() {
        let mut layout = OutputLayout::default();
        layout.add(id(1), "DP-1", Size::new(1920, 1080));
        assert!(layout.magnify());
        assert_eq!(layout.outputs()[0].scale(), 1.1);
        for _ in 0..100 {
            layout.magnify();
        }
        assert_eq!(layout.outputs()[0].scale(), MAX_SCALE);
        assert!(!layout.magnify());
        for _ in 0..100 {
            layout.reduce();
        }
        assert_eq!(layout.outputs()[0].scale(), MIN_SCALE);
        assert_eq!(layout.outputs()[0].logical_size(), Size::new(3840, 2160));
    }

    #[test]
    fn test_configured_scale_and_position() {
        let mut configured = BTreeMap::new();
        configured.insert(
            "DP-2".to_string(),
            OutputConfig {
                scale: 1.5,
                position: Some(Point::new(0, 0)),
            },
        );
        let mut layout = OutputLayout::new(configured);
        layout.add(id(1), "DP-1", Size::new(1920, 1080));
        layout.add(id(2), "DP-2", Size::new(3000, 1500));
        assert_eq!(layout.find_by_name("DP-2").unwrap().geometry(), Rectangle::new(0, 0, 2000, 1000));
        assert_eq!(layout.find_by_name("DP-1").unwrap().position(), Point::new(2000, 0));
    }

    #[test]
    fn test_state_round_trips_through_file() -> Result<()> {
        let mut layout = OutputLayout::default();
        layout.add(id(1), "eDP-1", Size::new(2880, 1800));
        layout.set_scale(id(1), 1.8);

        let dir = tempdir()?;
        let path = dir.path().join("nested").join("state.plist");
        layout.save_state(&path)?;
        let state = load_output_state(&path)?;
        assert_eq!(state["eDP-1"].scale, 1.8);
        assert_eq!(state["eDP-1"].position, Some(Point::new(0, 0)));

        let mut restored = OutputLayout::new(state);
        restored.add(id(7), "eDP-1", Size::new(2880, 1800));
        assert_eq!(restored.outputs()[0].scale(), 1.8);
        Ok(())
    }
}

//! Planner trace: graph dumps taken as phases and rules change the graph.

use std::fs;
use std::path::{Path, PathBuf};

use common_error::WeirResult;
use log::warn;
use weir_logical::{ElementGraph, GraphDump};

/// Collects dumps in memory and mirrors them into a directory when set.
#[derive(Debug, Default)]
pub(crate) struct TraceRecorder {
    enabled: bool,
    dir: Option<PathBuf>,
    dumps: Vec<GraphDump>,
}

impl TraceRecorder {
    pub(crate) fn new(enabled: bool, dir: Option<PathBuf>) -> Self {
        Self {
            enabled,
            dir,
            dumps: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, label: impl Into<String>, graph: &ElementGraph) {
        if !self.enabled {
            return;
        }
        let dump = GraphDump::new(label, graph);
        if let Some(dir) = &self.dir {
            if let Err(e) = write_dump(dir, self.dumps.len(), &dump) {
                warn!("could not write trace dump '{}': {e}", dump.label);
            }
        }
        self.dumps.push(dump);
    }

    pub(crate) fn dumps(&self) -> &[GraphDump] {
        &self.dumps
    }

    /// Write the failure snapshot's last dump and the index, then hand the
    /// dumps back.
    pub(crate) fn finish(self, failed: Option<&GraphDump>) -> Vec<GraphDump> {
        if let Some(dir) = &self.dir {
            if let Some(dump) = failed {
                if let Err(e) = write_dump(dir, self.dumps.len(), dump) {
                    warn!("could not write failure dump: {e}");
                }
            }
            if self.enabled {
                if let Err(e) = write_index(dir, &self.dumps) {
                    warn!("could not write trace index: {e}");
                }
            }
        }
        self.dumps
    }
}

fn write_dump(dir: &Path, index: usize, dump: &GraphDump) -> WeirResult<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{index:03}-{}.dot", dump.file_stem()));
    fs::write(path, &dump.dot)?;
    Ok(())
}

fn write_index(dir: &Path, dumps: &[GraphDump]) -> WeirResult<()> {
    fs::create_dir_all(dir)?;
    let labels: Vec<&str> = dumps.iter().map(|d| d.label.as_str()).collect();
    fs::write(dir.join("trace.json"), serde_json::to_vec_pretty(&labels)?)?;
    Ok(())
}

/// Write dumps as numbered `.dot` files.
pub fn write_dumps(dir: &Path, dumps: &[GraphDump]) -> WeirResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(dumps.len());
    for (index, dump) in dumps.iter().enumerate() {
        let path = dir.join(format!("{index:03}-{}.dot", dump.file_stem()));
        fs::write(&path, &dump.dot)?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_recorder_keeps_nothing() {
        let mut recorder = TraceRecorder::new(false, None);
        recorder.record("initial", &ElementGraph::new());
        assert!(recorder.dumps().is_empty());
    }

    #[test]
    fn test_write_dumps() {
        let dir = tempfile::tempdir().unwrap();
        let dumps = vec![
            GraphDump::new("initial", &ElementGraph::new()),
            GraphDump::new("PartitionSteps/boundaries", &ElementGraph::new()),
        ];
        let paths = write_dumps(dir.path(), &dumps).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[1].ends_with("001-PartitionSteps_boundaries.dot"));
        assert!(fs::read_to_string(&paths[0]).unwrap().starts_with("digraph"));
    }
}

//! Insertion point lookup for new pipeline stages
//!
//! Text search stands in for a parser here. [`InsertionLocator`] is the seam
//! a structural implementation would replace.

use serde::{Deserialize, Serialize};

/// Where a new stage goes: right after `marker`, which starts at `offset`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionPoint {
    pub marker: String,
    pub offset: usize,
}

impl InsertionPoint {
    /// Byte offset just past the marker; `None` on overflow
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.marker.len())
    }
}

/// Locates the insertion point for a new pipeline stage
pub trait InsertionLocator: Send + Sync {
    fn locate_insertion_point(&self, content: &str) -> Option<InsertionPoint>;
}

/// Picks the marker whose last occurrence is latest in the file
#[derive(Debug, Clone)]
pub struct AnchorLocator {
    anchors: Vec<String>,
}

impl AnchorLocator {
    pub fn new<I, S>(anchors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            anchors: anchors.into_iter().map(Into::into).collect(),
        }
    }

    /// Last-occurrence offset of every marker present in `content`
    pub fn search(&self, content: &str) -> Vec<InsertionPoint> {
        self.anchors
            .iter()
            .filter(|a| !a.is_empty())
            .filter_map(|anchor| {
                content.rfind(anchor.as_str()).map(|offset| InsertionPoint {
                    marker: anchor.clone(),
                    offset,
                })
            })
            .collect()
    }
}

impl InsertionLocator for AnchorLocator {
    /// Ties on offset go to the marker listed first
    fn locate_insertion_point(&self, content: &str) -> Option<InsertionPoint> {
        let mut best: Option<InsertionPoint> = None;
        for found in self.search(content) {
            if best.as_ref().map_or(true, |b| found.offset > b.offset) {
                best = Some(found);
            }
        }
        best
    }
}

/// Insert `stage` on a new line right after the located marker
///
/// `None` when the locator finds no marker or reports a position that is
/// out of range or inside a character; the content is not touched.
pub fn insert_after_latest_anchor(
    content: &str,
    locator: &dyn InsertionLocator,
    stage: &str,
) -> Option<String> {
    let point = locator.locate_insertion_point(content)?;
    let at = point.end()?;
    let (head, tail) = (content.get(..at)?, content.get(at..)?);
    let mut out = String::with_capacity(content.len() + stage.len() + 1);
    out.push_str(head);
    out.push('\n');
    out.push_str(stage);
    out.push_str(tail);
    Some(out)
}

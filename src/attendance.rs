//! Raid attendance from a screenshot of the raid frame.
//!
//! The frame is a grid of name cells; every cell runs the name cascade and
//! any recognised name counts as present.

use image::RgbaImage;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::cancel::CancellationToken;
use crate::config::AttendanceGrid;
use crate::ocr::{NameRequest, OcrMode, RecognitionCascade, Region};
use crate::resolver::{MatchResult, NameResolver};

/// Position of one name cell in the raid frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CellPosition {
    pub block: u32,
    pub row: usize,
    pub col: usize,
    pub region: Region,
}

impl CellPosition {
    fn item_id(&self) -> String {
        format!("b{}_r{}_c{}", self.block, self.row, self.col)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttendanceCell {
    #[serde(flatten)]
    pub position: CellPosition,
    pub result: MatchResult,
}

/// Attendance of one or more raid-frame screenshots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceSheet {
    pub cells: Vec<AttendanceCell>,
    pub names: BTreeSet<String>,
}

impl AttendanceSheet {
    pub fn merge(&mut self, other: AttendanceSheet) {
        self.cells.extend(other.cells);
        self.names.extend(other.names);
    }

    /// Cells where no name could be recognised.
    pub fn unknown_cells(&self) -> usize {
        self.cells.iter().filter(|c| !c.result.is_usable()).count()
    }
}

/// Every cell of the grid, block by block, row by row.
pub fn grid_cells(grid: &AttendanceGrid) -> Vec<CellPosition> {
    let mut cells = Vec::new();
    for block in 0..grid.blocks {
        let block_y = grid.origin.y + block as i32 * grid.block_shift;
        for (row, row_offset) in grid.row_offsets.iter().enumerate() {
            for (col, col_offset) in grid.col_offsets.iter().enumerate() {
                cells.push(CellPosition {
                    block,
                    row,
                    col,
                    region: Region::new(
                        grid.origin.x + col_offset,
                        block_y + row_offset,
                        grid.cell_width,
                        grid.cell_height,
                    ),
                });
            }
        }
    }
    cells
}

/// Recognises every grid cell that fits inside `image`, in parallel.
pub fn collect_attendance(
    image: &RgbaImage,
    grid: &AttendanceGrid,
    cascade: &RecognitionCascade,
    resolver: &NameResolver,
    mode: OcrMode,
    cancel: &CancellationToken,
) -> AttendanceSheet {
    let (width, height) = image.dimensions();
    let cells: Vec<CellPosition> = grid_cells(grid)
        .into_iter()
        .filter(|cell| cell.region.fits(width, height))
        .collect();

    let cells: Vec<AttendanceCell> = cells
        .par_iter()
        .filter_map(|position| {
            if cancel.is_cancelled() {
                return None;
            }
            let request = NameRequest::attendance(mode, position.item_id());
            let recognition = cascade.recognize_name(image, position.region, resolver, &request);
            Some(AttendanceCell {
                position: *position,
                result: recognition.result,
            })
        })
        .collect();

    let names = cells
        .iter()
        .filter(|cell| cell.result.is_usable())
        .filter_map(|cell| cell.result.name.clone())
        .collect();

    AttendanceSheet { cells, names }
}

//! Axis bookkeeping: non-singleton axes, the (c, y, x) positions and the
//! `moveaxis` permutation that brings every level to (Y, X, C, ...).

use serde::Serialize;

use crate::error::ReaderError;
use crate::format::OmeMetadata;

/// Lower-cased letters of `dim_order` whose size is greater than one.
///
/// `"TCZYX"` with T=1, C=3, Z=1 gives `"cyx"`.
pub fn axes_string(meta: &OmeMetadata) -> String {
    meta.dim_order
        .chars()
        .filter(|&axis| meta.size_of(axis).unwrap_or(1) > 1)
        .map(|axis| axis.to_ascii_lowercase())
        .collect()
}

/// Positions of the channel and spatial axes within the axes string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AxesOrder {
    pub c: usize,
    pub y: usize,
    pub x: usize,
}

impl AxesOrder {
    /// Locate `c`, `y` and `x` in `axes`.
    ///
    /// Each must occur exactly once, otherwise `MetadataAxisMissing`.
    pub fn from_axes(axes: &str) -> Result<Self, ReaderError> {
        let find = |axis: char| {
            let mut positions = axes.chars().enumerate().filter(|&(_, a)| a == axis);
            match (positions.next(), positions.next()) {
                (Some((index, _)), None) => Ok(index),
                _ => Err(ReaderError::MetadataAxisMissing {
                    axis,
                    axes: axes.to_string(),
                }),
            }
        };

        Ok(AxesOrder {
            c: find('c')?,
            y: find('y')?,
            x: find('x')?,
        })
    }

    /// Source positions for `moveaxis`, in destination order (Y, X, C).
    pub fn source(&self) -> [usize; 3] {
        [self.y, self.x, self.c]
    }
}

/// Axis permutation equivalent to numpy's `moveaxis(a, source, destination)`.
///
/// Axis `i` of the result is axis `perm[i]` of the input. Axes not named in
/// `source` keep their relative order in the remaining slots.
pub fn moveaxis_permutation(
    ndim: usize,
    source: &[usize],
    destination: &[usize],
) -> Result<Vec<usize>, ReaderError> {
    if source.len() != destination.len() {
        return Err(ReaderError::InvalidRequest(format!(
            "moveaxis got {} source and {} destination axes",
            source.len(),
            destination.len()
        )));
    }
    for (name, axes) in [("source", source), ("destination", destination)] {
        for (i, &axis) in axes.iter().enumerate() {
            if axis >= ndim {
                return Err(ReaderError::InvalidRequest(format!(
                    "{} axis {} is out of bounds for {} dimensions",
                    name, axis, ndim
                )));
            }
            if axes[..i].contains(&axis) {
                return Err(ReaderError::InvalidRequest(format!(
                    "repeated {} axis {}",
                    name, axis
                )));
            }
        }
    }

    let mut rest = (0..ndim).filter(|axis| !source.contains(axis));
    let mut slots: Vec<Option<usize>> = vec![None; ndim];
    for (&src, &dst) in source.iter().zip(destination) {
        slots[dst] = Some(src);
    }

    let mut perm = Vec::with_capacity(ndim);
    for slot in slots {
        match slot.or_else(|| rest.next()) {
            Some(axis) => perm.push(axis),
            None => {
                return Err(ReaderError::InvalidRequest(
                    "moveaxis left an axis unassigned".to_string(),
                ))
            }
        }
    }
    Ok(perm)
}

/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! Typed per-context state dictionary. spec.md §6 describes the original
//! as a closed set of externally-visible state keys, each with a
//! declared type, accessed through a stringly/enum-keyed `icetStateGet*`
//! family. Idiomatic Rust replaces the void* dictionary with typed
//! struct fields (`ContextState`); a `StateKey`/`StateValue` pair is kept
//! alongside for the handful of callers (diagnostics, the frame driver,
//! tests) that want the original's generic-key ergonomics, the way
//! `components/config`'s preference table offers both typed accessors
//! and a generic lookup.

use icet_image::{CompositeMode, ImageFormat, PackedBackground};
use icet_projection::ContainedBounds;
use icet_strategies::{MultiTileStrategy, SingleImageStrategy};
use icet_tiles::{validate_composite_order, TileSet};

use crate::error::{IcetError, IcetResult};
use crate::timing::FrameTimer;

/// Identifies one state value for the generic `get`/`set` accessors.
/// Mirrors the externally-visible keys of spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKey {
    Rank,
    NumProcesses,
    MagicK,
    CompositeOrder,
    TotalImageCount,
}

/// A dynamically-typed state value, for the generic accessors only.
/// Internal code reads/writes the typed `ContextState` fields directly.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Int(i32),
    IntArray(Vec<i32>),
}

/// All per-context configuration and per-frame derived state. One
/// `Context` owns exactly one of these. spec.md §6 state-key set.
#[derive(Debug, Clone)]
pub struct ContextState {
    pub rank: i32,
    pub num_processes: i32,

    pub format: ImageFormat,
    pub background: PackedBackground,
    pub tiles: TileSet,
    pub composite_mode: CompositeMode,
    pub composite_order: Option<Vec<i32>>,
    pub replication_group: Option<Vec<i32>>,
    pub magic_k: u32,
    pub strategy: MultiTileStrategy,
    pub single_image_strategy: SingleImageStrategy,
    /// Whether ordered-blend background correction (spec.md §4.6 step 2)
    /// is applied when a composite order is set and the mode is Blend.
    pub blend_background_correction: bool,

    /// Per-frame derived state, `None` before the first `draw_frame`.
    pub contained_viewport: Option<ContainedBounds>,
    pub tile_contrib_counts: Vec<u32>,
    pub total_image_count: u32,

    pub timing: FrameTimer,
}

impl ContextState {
    pub fn new(rank: i32, num_processes: i32, format: ImageFormat) -> Self {
        ContextState {
            rank,
            num_processes,
            format,
            background: PackedBackground::new([0.0, 0.0, 0.0, 0.0]),
            tiles: TileSet::new(),
            composite_mode: CompositeMode::ZBuffer,
            composite_order: None,
            replication_group: None,
            magic_k: 4,
            strategy: MultiTileStrategy::Reduce,
            single_image_strategy: SingleImageStrategy::Automatic,
            blend_background_correction: true,
            contained_viewport: None,
            tile_contrib_counts: Vec::new(),
            total_image_count: 0,
            timing: FrameTimer::default(),
        }
    }

    /// Validates `order` is a permutation of `0..num_processes` before
    /// accepting it, per spec.md §9 supplemented feature #4.
    pub fn set_composite_order(&mut self, order: Vec<i32>) -> IcetResult<()> {
        validate_composite_order(&order, self.num_processes)?;
        self.composite_order = Some(order);
        Ok(())
    }

    pub fn get(&self, key: StateKey) -> Option<StateValue> {
        match key {
            StateKey::Rank => Some(StateValue::Int(self.rank)),
            StateKey::NumProcesses => Some(StateValue::Int(self.num_processes)),
            StateKey::MagicK => Some(StateValue::Int(self.magic_k as i32)),
            StateKey::CompositeOrder => {
                self.composite_order.clone().map(StateValue::IntArray)
            }
            StateKey::TotalImageCount => Some(StateValue::Int(self.total_image_count as i32)),
        }
    }

    pub fn set(&mut self, key: StateKey, value: StateValue) -> IcetResult<()> {
        match (key, value) {
            (StateKey::MagicK, StateValue::Int(v)) if v >= 2 => {
                self.magic_k = v as u32;
                Ok(())
            }
            (StateKey::CompositeOrder, StateValue::IntArray(order)) => {
                self.set_composite_order(order)
            }
            (StateKey::Rank | StateKey::NumProcesses | StateKey::TotalImageCount, _) => {
                Err(IcetError::InvalidOperation)
            }
            _ => Err(IcetError::InvalidValue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icet_image::ColorFormat;
    use icet_image::DepthFormat;

    fn format() -> ImageFormat {
        ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::Float)
    }

    #[test]
    fn composite_order_must_be_a_permutation() {
        let mut state = ContextState::new(0, 3, format());
        assert!(state.set_composite_order(vec![2, 0, 1]).is_ok());
        assert_eq!(state.composite_order, Some(vec![2, 0, 1]));
        assert!(state.set_composite_order(vec![0, 0, 1]).is_err());
        // A failed set must not clobber the previously accepted order.
        assert_eq!(state.composite_order, Some(vec![2, 0, 1]));
    }

    #[test]
    fn generic_accessors_round_trip_magic_k() {
        let mut state = ContextState::new(0, 1, format());
        state.set(StateKey::MagicK, StateValue::Int(8)).unwrap();
        assert_eq!(state.get(StateKey::MagicK), Some(StateValue::Int(8)));
    }

    #[test]
    fn rank_is_read_only() {
        let mut state = ContextState::new(2, 4, format());
        assert_eq!(state.get(StateKey::Rank), Some(StateValue::Int(2)));
        assert!(state.set(StateKey::Rank, StateValue::Int(0)).is_err());
    }
}

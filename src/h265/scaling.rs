// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! `scaling_list_data`, ITU-T H.265 section 7.3.4.

use crate::bits::BitCursor;
use base::Error;
use serde::Serialize;

/// One matrix slot: either predicted from a previous matrix of the same
/// size class, or explicitly delta-coded.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "mode")]
pub enum ScalingList {
    Predicted {
        scaling_list_pred_matrix_id_delta: u32,
    },
    Explicit {
        /// Present for the 16x16 and 32x32 size classes.
        scaling_list_dc_coef_minus8: Option<i32>,
        coefficients: Vec<u8>,
    },
}

/// Four size classes (4x4, 8x8, 16x16, 32x32) with six matrices each,
/// except 32x32 which has two.
#[derive(Clone, Debug, Serialize)]
pub struct ScalingListData {
    pub lists: Vec<Vec<ScalingList>>,
}

pub fn parse_scaling_list_data(c: &mut BitCursor) -> Result<ScalingListData, Error> {
    let mut lists = Vec::with_capacity(4);
    for size_id in 0..4u32 {
        let num_matrices = if size_id == 3 { 2 } else { 6 };
        let mut matrices = Vec::with_capacity(num_matrices);
        for _ in 0..num_matrices {
            if !c.read_bool()? {
                // scaling_list_pred_mode_flag == 0
                matrices.push(ScalingList::Predicted {
                    scaling_list_pred_matrix_id_delta: c.read_ue()?,
                });
                continue;
            }
            let coef_num = std::cmp::min(64usize, 1 << (4 + (size_id << 1)));
            let mut next_coef: i32 = 8;
            let scaling_list_dc_coef_minus8 = if size_id > 1 {
                let dc = c.read_se()?;
                next_coef = dc + 8;
                Some(dc)
            } else {
                None
            };
            let mut coefficients = Vec::with_capacity(coef_num);
            for _ in 0..coef_num {
                let delta = c.read_se()?;
                next_coef = (next_coef + delta + 256) % 256;
                coefficients.push(next_coef as u8);
            }
            matrices.push(ScalingList::Explicit {
                scaling_list_dc_coef_minus8,
                coefficients,
            });
        }
        lists.push(matrices);
    }
    Ok(ScalingListData { lists })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::BitWriter;

    #[test]
    fn all_predicted_from_default() {
        // Every matrix uses pred_mode 0 with delta 0 (the default lists).
        let mut w = BitWriter::new();
        for size_id in 0..4 {
            let n = if size_id == 3 { 2 } else { 6 };
            for _ in 0..n {
                w.put_bit(false);
                w.put_ue(0);
            }
        }
        w.put_trailing_bits();
        let bytes = w.finish();
        let mut c = BitCursor::new(&bytes);
        let data = parse_scaling_list_data(&mut c).unwrap();
        assert_eq!(data.lists.len(), 4);
        assert_eq!(data.lists[0].len(), 6);
        assert_eq!(data.lists[3].len(), 2);
        assert!(data
            .lists
            .iter()
            .flatten()
            .all(|m| matches!(m, ScalingList::Predicted { .. })));
    }

    #[test]
    fn explicit_matrix_sizes_and_dc() {
        let mut w = BitWriter::new();
        for size_id in 0..4 {
            let n = if size_id == 3 { 2 } else { 6 };
            for _ in 0..n {
                w.put_bit(true); // explicit
                if size_id > 1 {
                    w.put_se(8); // dc_coef_minus8 -> dc 16
                }
                let coef_num = std::cmp::min(64, 1usize << (4 + (size_id << 1)));
                w.put_se(1); // first delta: 8 -> 9
                for _ in 1..coef_num {
                    w.put_se(0);
                }
            }
        }
        w.put_trailing_bits();
        let bytes = w.finish();
        let mut c = BitCursor::new(&bytes);
        let data = parse_scaling_list_data(&mut c).unwrap();
        match &data.lists[0][0] {
            ScalingList::Explicit {
                scaling_list_dc_coef_minus8,
                coefficients,
            } => {
                assert_eq!(*scaling_list_dc_coef_minus8, None);
                assert_eq!(coefficients.len(), 16);
                assert_eq!(coefficients[0], 9);
                assert_eq!(coefficients[15], 9);
            }
            other => panic!("wrong mode: {other:?}"),
        }
        match &data.lists[2][0] {
            ScalingList::Explicit {
                scaling_list_dc_coef_minus8,
                coefficients,
            } => {
                // DC seeds the running coefficient: 16 + 1 = 17.
                assert_eq!(*scaling_list_dc_coef_minus8, Some(8));
                assert_eq!(coefficients.len(), 64);
                assert_eq!(coefficients[0], 17);
            }
            other => panic!("wrong mode: {other:?}"),
        }
    }
}

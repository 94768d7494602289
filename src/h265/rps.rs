// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Short-term reference picture sets, ITU-T H.265 section 7.3.7.

use crate::bits::BitCursor;
use base::Error;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct RefPicDelta {
    pub delta_poc_minus1: u32,
    pub used_by_curr_pic: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "form")]
pub enum ShortTermRefPicSet {
    /// Inter-predicted from an earlier set in the SPS (or, from a slice
    /// header, from any SPS set).
    Predicted {
        /// Read only when `stRpsIdx == num_short_term_ref_pic_sets`
        /// (slice-header position).
        delta_idx_minus1: Option<u32>,
        delta_rps_sign: bool,
        abs_delta_rps_minus1: u32,
        /// Exactly `NumDeltaPocs(refRps) + 1` entries.
        used_by_curr_pic_flag: Vec<bool>,
        /// Entry `j` read only when `used_by_curr_pic_flag[j]` is 0.
        use_delta_flag: Vec<Option<bool>>,
        /// Derived picture count of this set.
        num_delta_pocs: u32,
    },
    Explicit {
        negative: Vec<RefPicDelta>,
        positive: Vec<RefPicDelta>,
    },
}

impl ShortTermRefPicSet {
    pub fn num_delta_pocs(&self) -> u32 {
        match self {
            ShortTermRefPicSet::Predicted { num_delta_pocs, .. } => *num_delta_pocs,
            ShortTermRefPicSet::Explicit { negative, positive } => {
                (negative.len() + positive.len()) as u32
            }
        }
    }
}

/// Parses one `short_term_ref_pic_set(stRpsIdx)`. `prior` holds the sets
/// already parsed from the SPS, used to size the inter-prediction flag
/// arrays; `num_sets` is `num_short_term_ref_pic_sets`.
pub fn parse_short_term_ref_pic_set(
    c: &mut BitCursor,
    st_rps_idx: u32,
    num_sets: u32,
    prior: &[ShortTermRefPicSet],
) -> Result<ShortTermRefPicSet, Error> {
    let inter_pred = if st_rps_idx != 0 { c.read_bool()? } else { false };
    if inter_pred {
        let delta_idx_minus1 = if st_rps_idx == num_sets {
            Some(c.read_ue()?)
        } else {
            None
        };
        let delta_idx = delta_idx_minus1.unwrap_or(0) + 1;
        let ref_idx = st_rps_idx.saturating_sub(delta_idx);
        let ref_num_delta_pocs = prior
            .get(ref_idx as usize)
            .map(|s| s.num_delta_pocs())
            .unwrap_or(0);

        let delta_rps_sign = c.read_bool()?;
        let abs_delta_rps_minus1 = c.read_ue()?;

        let n = ref_num_delta_pocs as usize + 1;
        let mut used_by_curr_pic_flag = Vec::with_capacity(n);
        let mut use_delta_flag = Vec::with_capacity(n);
        let mut num_delta_pocs = 0u32;
        for _ in 0..n {
            let used = c.read_bool()?;
            used_by_curr_pic_flag.push(used);
            let use_delta = if !used {
                let f = c.read_bool()?;
                use_delta_flag.push(Some(f));
                f
            } else {
                // use_delta_flag inferred to be 1.
                use_delta_flag.push(None);
                true
            };
            if use_delta {
                num_delta_pocs += 1;
            }
        }
        Ok(ShortTermRefPicSet::Predicted {
            delta_idx_minus1,
            delta_rps_sign,
            abs_delta_rps_minus1,
            used_by_curr_pic_flag,
            use_delta_flag,
            num_delta_pocs,
        })
    } else {
        let num_negative_pics = c.read_ue()?;
        let num_positive_pics = c.read_ue()?;
        if num_negative_pics > 4096 || num_positive_pics > 4096 {
            base::bail_t!(
                Malformed,
                "implausible ref-pic counts {}/{}",
                num_negative_pics,
                num_positive_pics
            );
        }
        let mut negative = Vec::with_capacity(num_negative_pics as usize);
        for _ in 0..num_negative_pics {
            negative.push(RefPicDelta {
                delta_poc_minus1: c.read_ue()?,
                used_by_curr_pic: c.read_bool()?,
            });
        }
        let mut positive = Vec::with_capacity(num_positive_pics as usize);
        for _ in 0..num_positive_pics {
            positive.push(RefPicDelta {
                delta_poc_minus1: c.read_ue()?,
                used_by_curr_pic: c.read_bool()?,
            });
        }
        Ok(ShortTermRefPicSet::Explicit { negative, positive })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::BitWriter;

    #[test]
    fn explicit_form_single_negative() {
        // num_negative_pics=1, num_positive_pics=0,
        // delta_poc_s0_minus1[0]=0, used_by_curr_pic_s0_flag[0]=1
        // -> one negative POC with delta -1, used.
        let bytes = [0b0101_1100];
        let mut c = BitCursor::new(&bytes);
        let set = parse_short_term_ref_pic_set(&mut c, 0, 1, &[]).unwrap();
        match &set {
            ShortTermRefPicSet::Explicit { negative, positive } => {
                assert_eq!(negative.len(), 1);
                assert!(positive.is_empty());
                assert_eq!(negative[0].delta_poc_minus1, 0);
                assert!(negative[0].used_by_curr_pic);
                // delta POC value is -(delta_poc_minus1 + 1) = -1.
            }
            other => panic!("wrong form: {other:?}"),
        }
        assert_eq!(set.num_delta_pocs(), 1);
    }

    #[test]
    fn predicted_form_reads_exactly_num_delta_pocs_plus_one_flags() {
        // Reference set: 2 negative + 1 positive = 3 delta POCs.
        let prior = {
            let mut w = BitWriter::new();
            w.put_ue(2); // num_negative_pics
            w.put_ue(1); // num_positive_pics
            for _ in 0..3 {
                w.put_ue(0); // delta_poc_minus1
                w.put_bit(true); // used_by_curr_pic
            }
            w.put_trailing_bits();
            let bytes = w.finish();
            let mut c = BitCursor::new(&bytes);
            parse_short_term_ref_pic_set(&mut c, 0, 2, &[]).unwrap()
        };
        assert_eq!(prior.num_delta_pocs(), 3);

        let mut w = BitWriter::new();
        w.put_bit(true); // inter_ref_pic_set_prediction_flag
        w.put_bit(false); // delta_rps_sign
        w.put_ue(0); // abs_delta_rps_minus1
        // NumDeltaPocs(ref) + 1 = 4 used flags; the two zeros each pull in
        // a use_delta_flag.
        for used in [true, false, true, false] {
            w.put_bit(used);
            if !used {
                w.put_bit(true); // use_delta_flag
            }
        }
        w.put_trailing_bits();
        let bytes = w.finish();
        let mut c = BitCursor::new(&bytes);
        let set = parse_short_term_ref_pic_set(&mut c, 1, 2, std::slice::from_ref(&prior)).unwrap();
        match &set {
            ShortTermRefPicSet::Predicted {
                delta_idx_minus1,
                used_by_curr_pic_flag,
                use_delta_flag,
                ..
            } => {
                // stRpsIdx != num_sets, so no delta_idx_minus1.
                assert_eq!(*delta_idx_minus1, None);
                assert_eq!(used_by_curr_pic_flag.len(), 4);
                assert_eq!(use_delta_flag[0], None);
                assert_eq!(use_delta_flag[1], Some(true));
            }
            other => panic!("wrong form: {other:?}"),
        }
    }
}

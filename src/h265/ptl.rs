// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! `profile_tier_level`, ITU-T H.265 section 7.3.3.
//!
//! The constraint-flag ladder is keyed off `profile_idc` *or* any matching
//! `profile_compatibility_flag[j]`, with reserved paddings whose widths
//! depend on which branch was taken; the same ladder repeats per sub-layer.

use crate::bits::BitCursor;
use base::Error;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct ProfileTierLevel {
    /// Present iff `profilePresentFlag` was set at the reference point.
    pub general: Option<ProfileTier>,
    pub general_level_idc: u8,
    pub sub_layers: Vec<SubLayer>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SubLayer {
    pub profile: Option<ProfileTier>,
    pub level_idc: Option<u8>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProfileTier {
    pub profile_space: u8,
    pub tier_flag: bool,
    pub profile_idc: u8,
    pub profile_compatibility_flag: Vec<bool>,
    pub progressive_source_flag: bool,
    pub interlaced_source_flag: bool,
    pub non_packed_constraint_flag: bool,
    pub frame_only_constraint_flag: bool,
    pub constraints: ConstraintFlags,
    /// `inbld_flag` where defined, else the reserved bit.
    pub inbld_flag: Option<bool>,
}

/// Constraint sub-flags; which set exists depends on the profile family.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "family")]
pub enum ConstraintFlags {
    /// Range extensions and later (profiles 4..=11).
    Rext {
        max_12bit_constraint_flag: bool,
        max_10bit_constraint_flag: bool,
        max_8bit_constraint_flag: bool,
        max_422chroma_constraint_flag: bool,
        max_420chroma_constraint_flag: bool,
        max_monochrome_constraint_flag: bool,
        intra_constraint_flag: bool,
        one_picture_only_constraint_flag: bool,
        lower_bit_rate_constraint_flag: bool,
        /// Profiles 5/9/10/11 only; its absence widens the reserved pad.
        max_14bit_constraint_flag: Option<bool>,
    },
    /// Main 10 still picture (profile 2).
    Main10StillPicture { one_picture_only_constraint_flag: bool },
    /// Everything else: 43 reserved bits.
    None,
}

fn matches_family(profile_idc: u8, compat: &[bool], family: &[u8]) -> bool {
    family
        .iter()
        .any(|&j| profile_idc == j || compat.get(j as usize).copied().unwrap_or(false))
}

fn parse_profile_tier(c: &mut BitCursor) -> Result<ProfileTier, Error> {
    let profile_space = c.read_u(2)? as u8;
    let tier_flag = c.read_bool()?;
    let profile_idc = c.read_u(5)? as u8;
    let mut profile_compatibility_flag = Vec::with_capacity(32);
    for _ in 0..32 {
        profile_compatibility_flag.push(c.read_bool()?);
    }
    let progressive_source_flag = c.read_bool()?;
    let interlaced_source_flag = c.read_bool()?;
    let non_packed_constraint_flag = c.read_bool()?;
    let frame_only_constraint_flag = c.read_bool()?;

    let compat = &profile_compatibility_flag;
    let constraints = if matches_family(profile_idc, compat, &[4, 5, 6, 7, 8, 9, 10, 11]) {
        let max_12bit_constraint_flag = c.read_bool()?;
        let max_10bit_constraint_flag = c.read_bool()?;
        let max_8bit_constraint_flag = c.read_bool()?;
        let max_422chroma_constraint_flag = c.read_bool()?;
        let max_420chroma_constraint_flag = c.read_bool()?;
        let max_monochrome_constraint_flag = c.read_bool()?;
        let intra_constraint_flag = c.read_bool()?;
        let one_picture_only_constraint_flag = c.read_bool()?;
        let lower_bit_rate_constraint_flag = c.read_bool()?;
        let max_14bit_constraint_flag = if matches_family(profile_idc, compat, &[5, 9, 10, 11]) {
            let f = c.read_bool()?;
            c.skip(33)?; // reserved_zero_33bits
            Some(f)
        } else {
            c.skip(34)?; // reserved_zero_34bits
            None
        };
        ConstraintFlags::Rext {
            max_12bit_constraint_flag,
            max_10bit_constraint_flag,
            max_8bit_constraint_flag,
            max_422chroma_constraint_flag,
            max_420chroma_constraint_flag,
            max_monochrome_constraint_flag,
            intra_constraint_flag,
            one_picture_only_constraint_flag,
            lower_bit_rate_constraint_flag,
            max_14bit_constraint_flag,
        }
    } else if matches_family(profile_idc, compat, &[2]) {
        c.skip(7)?; // reserved_zero_7bits
        let one_picture_only_constraint_flag = c.read_bool()?;
        c.skip(35)?; // reserved_zero_35bits
        ConstraintFlags::Main10StillPicture {
            one_picture_only_constraint_flag,
        }
    } else {
        c.skip(43)?; // reserved_zero_43bits
        ConstraintFlags::None
    };

    let inbld_flag = if matches_family(profile_idc, compat, &[1, 2, 3, 4, 5, 9, 11]) {
        Some(c.read_bool()?)
    } else {
        let _reserved = c.read_bool()?;
        None
    };

    Ok(ProfileTier {
        profile_space,
        tier_flag,
        profile_idc,
        profile_compatibility_flag,
        progressive_source_flag,
        interlaced_source_flag,
        non_packed_constraint_flag,
        frame_only_constraint_flag,
        constraints,
        inbld_flag,
    })
}

pub fn parse_profile_tier_level(
    c: &mut BitCursor,
    profile_present: bool,
    max_num_sub_layers_minus1: u8,
) -> Result<ProfileTierLevel, Error> {
    let general = if profile_present {
        Some(parse_profile_tier(c)?)
    } else {
        None
    };
    let general_level_idc = c.read_u8()?;

    let n = max_num_sub_layers_minus1 as usize;
    let mut profile_present_flags = Vec::with_capacity(n);
    let mut level_present_flags = Vec::with_capacity(n);
    for _ in 0..n {
        profile_present_flags.push(c.read_bool()?);
        level_present_flags.push(c.read_bool()?);
    }
    if n > 0 {
        for _ in n..8 {
            c.skip(2)?; // reserved_zero_2bits
        }
    }

    let mut sub_layers = Vec::with_capacity(n);
    for i in 0..n {
        let profile = if profile_present_flags[i] {
            Some(parse_profile_tier(c)?)
        } else {
            None
        };
        let level_idc = if level_present_flags[i] {
            Some(c.read_u8()?)
        } else {
            None
        };
        sub_layers.push(SubLayer { profile, level_idc });
    }

    Ok(ProfileTierLevel {
        general,
        general_level_idc,
        sub_layers,
    })
}

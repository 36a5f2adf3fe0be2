//! Speakers, ears and the labels that tie an impulse response to both.
//!
//! Labels are written as `<SPEAKER>-<ear>`, for example `FL-left` or
//! `SR-right`. Speaker names follow the usual surround layout:
//!
//! - `FL`, `FR`: front left and right
//! - `FC`: front center
//! - `BL`, `BR`: back left and right
//! - `SL`, `SR`: side left and right
//!
//! Parsing is case-insensitive for both parts.

use crate::error::{ImpulciferError, Result};

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, space0},
    combinator::{all_consuming, map, value},
    multi::separated_list1,
    sequence::{delimited, separated_pair},
    Finish, IResult,
};
use serde::{Deserialize, Serialize};

use std::{fmt, str::FromStr};

/// A loudspeaker position in the measurement rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Speaker {
    FL,
    FR,
    FC,
    BL,
    BR,
    SL,
    SR,
}

/// Which ear a microphone sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Ear {
    /// Left ear microphone
    Left,
    /// Right ear microphone
    Right,
}

/// The side of the head a speaker is on. A left side speaker must reach the
/// left ear first and a right side speaker the right ear, center speakers
/// can go either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// FL, BL, SL
    Left,
    /// FR, BR, SR
    Right,
    /// FC
    Center,
}

impl Speaker {
    /// All speakers, in the order they appear in the canonical channel order.
    pub const ALL: [Speaker; 7] = [
        Speaker::FL,
        Speaker::FR,
        Speaker::FC,
        Speaker::BL,
        Speaker::BR,
        Speaker::SL,
        Speaker::SR,
    ];

    /// The side of the listener this speaker is placed on.
    pub fn side(self) -> Side {
        match self {
            Speaker::FL | Speaker::BL | Speaker::SL => Side::Left,
            Speaker::FR | Speaker::BR | Speaker::SR => Side::Right,
            Speaker::FC => Side::Center,
        }
    }

    /// The upper case short name, e.g. `"FL"`.
    pub fn name(self) -> &'static str {
        match self {
            Speaker::FL => "FL",
            Speaker::FR => "FR",
            Speaker::FC => "FC",
            Speaker::BL => "BL",
            Speaker::BR => "BR",
            Speaker::SL => "SL",
            Speaker::SR => "SR",
        }
    }

    /// The label of this speaker as heard by the given ear.
    pub fn at(self, ear: Ear) -> ChannelLabel {
        ChannelLabel { speaker: self, ear }
    }
}

impl Ear {
    /// The lower case name used in labels.
    pub fn name(self) -> &'static str {
        match self {
            Ear::Left => "left",
            Ear::Right => "right",
        }
    }
}

/// Identifies one impulse response: a speaker as heard by one ear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelLabel {
    /// The speaker that played the sweep
    pub speaker: Speaker,
    /// The ear the microphone was in
    pub ear: Ear,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for ChannelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.speaker.name(), self.ear.name())
    }
}

fn parse_speaker(s: &str) -> IResult<&str, Speaker> {
    alt((
        value(Speaker::FL, tag_no_case("FL")),
        value(Speaker::FR, tag_no_case("FR")),
        value(Speaker::FC, tag_no_case("FC")),
        value(Speaker::BL, tag_no_case("BL")),
        value(Speaker::BR, tag_no_case("BR")),
        value(Speaker::SL, tag_no_case("SL")),
        value(Speaker::SR, tag_no_case("SR")),
    ))(s)
}

fn parse_ear(s: &str) -> IResult<&str, Ear> {
    alt((
        value(Ear::Left, tag_no_case("left")),
        value(Ear::Right, tag_no_case("right")),
    ))(s)
}

fn parse_label(s: &str) -> IResult<&str, ChannelLabel> {
    map(
        separated_pair(parse_speaker, char('-'), parse_ear),
        |(speaker, ear)| ChannelLabel { speaker, ear },
    )(s)
}

fn parse_speakers(s: &str) -> IResult<&str, Vec<Speaker>> {
    delimited(
        space0,
        separated_list1(delimited(space0, char(','), space0), parse_speaker),
        space0,
    )(s)
}

impl FromStr for Speaker {
    type Err = ImpulciferError;
    fn from_str(s: &str) -> Result<Self> {
        all_consuming(parse_speaker)(s.trim())
            .finish()
            .map(|(_remaining, speaker)| speaker)
            .map_err(|_| ImpulciferError::UnsupportedChannel(s.to_string()))
    }
}

impl FromStr for ChannelLabel {
    type Err = ImpulciferError;
    fn from_str(s: &str) -> Result<Self> {
        all_consuming(parse_label)(s.trim())
            .finish()
            .map(|(_remaining, label)| label)
            .map_err(|_| ImpulciferError::UnsupportedChannel(s.to_string()))
    }
}

impl TryFrom<String> for ChannelLabel {
    type Error = ImpulciferError;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ChannelLabel> for String {
    fn from(label: ChannelLabel) -> Self {
        label.to_string()
    }
}

/// Parses a comma separated speaker order such as `"FL,FR"` or
/// `"fl, fr, fc"`.
pub fn parse_speaker_list(s: &str) -> Result<Vec<Speaker>> {
    match all_consuming(parse_speakers)(s).finish() {
        Ok((_remaining, speakers)) => Ok(speakers),
        Err(nom::error::Error { input, .. }) => Err(ImpulciferError::UnsupportedChannel(
            input.split(',').next().unwrap_or(input).trim().to_string(),
        )),
    }
}

/// A fixed ordering of channel labels, used to lay out a set of impulse
/// responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelOrder(Vec<ChannelLabel>);

impl ChannelOrder {
    /// Wraps a list of labels.
    pub fn new(labels: Vec<ChannelLabel>) -> Self {
        Self(labels)
    }

    /// Every speaker in [`Speaker::ALL`] order, left ear first.
    pub fn canonical() -> Self {
        Self(
            Speaker::ALL
                .iter()
                .flat_map(|&s| [s.at(Ear::Left), s.at(Ear::Right)])
                .collect(),
        )
    }

    /// The order the HeSuVi player expects in its 14 channel HRIR files.
    pub fn hesuvi() -> Self {
        use Ear::{Left as L, Right as R};
        use Speaker::*;
        Self(vec![
            FL.at(L),
            FL.at(R),
            SL.at(L),
            SL.at(R),
            BL.at(L),
            BL.at(R),
            FC.at(L),
            FR.at(R),
            FR.at(L),
            SR.at(R),
            SR.at(L),
            BR.at(R),
            BR.at(L),
            FC.at(R),
        ])
    }

    /// The labels in order.
    pub fn labels(&self) -> &[ChannelLabel] {
        &self.0
    }

    /// Position of a label in this order.
    pub fn position(&self, label: ChannelLabel) -> Option<usize> {
        self.0.iter().position(|&l| l == label)
    }

    /// Speakers that appear in this order, each once, in order of first
    /// appearance.
    pub fn speakers(&self) -> Vec<Speaker> {
        let mut speakers: Vec<Speaker> = Vec::new();
        for label in &self.0 {
            if !speakers.contains(&label.speaker) {
                speakers.push(label.speaker);
            }
        }
        speakers
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ChannelOrder {
    fn default() -> Self {
        Self::canonical()
    }
}

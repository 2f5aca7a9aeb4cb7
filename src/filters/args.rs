//! Positional argument access for filter implementations.
//!
//! Every accessor either yields a typed value or a [`SkipReason`] naming the
//! offending position, so a filter can parse all of its arguments up front
//! with `?` and only then touch the image.

use super::SkipReason;
use crate::imaging::{Color, HAlign, VAlign};
use std::str::FromStr;

#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    tokens: &'a [String],
}

impl<'a> Args<'a> {
    pub fn new(tokens: &'a [String]) -> Self {
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Raw token at `index`; empty tokens count as absent.
    pub fn raw(&self, index: usize) -> Option<&'a str> {
        self.tokens
            .get(index)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn text(&self, index: usize, what: &'static str) -> Result<&'a str, SkipReason> {
        self.raw(index)
            .ok_or(SkipReason::MissingArgument { index, what })
    }

    fn parse<T: FromStr>(&self, index: usize, value: &str, problem: &str) -> Result<T, SkipReason> {
        value.parse().map_err(|_| SkipReason::BadArgument {
            index,
            value: value.to_string(),
            problem: problem.to_string(),
        })
    }

    pub fn int_or(&self, index: usize, default: i64) -> Result<i64, SkipReason> {
        match self.raw(index) {
            Some(v) => self.parse(index, v, "expected an integer"),
            None => Ok(default),
        }
    }

    pub fn int(&self, index: usize, what: &'static str) -> Result<i64, SkipReason> {
        let v = self.text(index, what)?;
        self.parse(index, v, "expected an integer")
    }

    /// Integer constrained to `min..=max`.
    pub fn int_in(
        &self,
        index: usize,
        default: i64,
        min: i64,
        max: i64,
    ) -> Result<i64, SkipReason> {
        let v = self.int_or(index, default)?;
        if v < min || v > max {
            return Err(self.out_of_range(index, v, min, max));
        }
        Ok(v)
    }

    pub fn float_or(&self, index: usize, default: f64) -> Result<f64, SkipReason> {
        match self.raw(index) {
            Some(v) => {
                let f: f64 = self.parse(index, v, "expected a number")?;
                if f.is_finite() {
                    Ok(f)
                } else {
                    Err(SkipReason::BadArgument {
                        index,
                        value: v.to_string(),
                        problem: "expected a finite number".into(),
                    })
                }
            }
            None => Ok(default),
        }
    }

    pub fn float_in(&self, index: usize, default: f64, min: f64, max: f64) -> Result<f64, SkipReason> {
        let v = self.float_or(index, default)?;
        if v < min || v > max {
            return Err(SkipReason::BadArgument {
                index,
                value: v.to_string(),
                problem: format!("must be between {min} and {max}"),
            });
        }
        Ok(v)
    }

    pub fn color_or(&self, index: usize, default: Color) -> Result<Color, SkipReason> {
        self.color_opt(index).map(|c| c.unwrap_or(default))
    }

    pub fn color_opt(&self, index: usize) -> Result<Option<Color>, SkipReason> {
        match self.raw(index) {
            Some(v) => Color::parse_hex(v).map(Some).ok_or_else(|| SkipReason::BadArgument {
                index,
                value: v.to_string(),
                problem: "expected a hex color".into(),
            }),
            None => Ok(None),
        }
    }

    pub fn color(&self, index: usize, what: &'static str) -> Result<Color, SkipReason> {
        self.text(index, what)?;
        self.color_opt(index)?
            .ok_or(SkipReason::MissingArgument { index, what })
    }

    pub fn bool_or(&self, index: usize, default: bool) -> Result<bool, SkipReason> {
        match self.raw(index) {
            Some(v) => crate::params::parse_bool(v).ok_or_else(|| SkipReason::BadArgument {
                index,
                value: v.to_string(),
                problem: "expected yes/no".into(),
            }),
            None => Ok(default),
        }
    }

    pub fn halign_or(&self, index: usize, default: HAlign) -> Result<HAlign, SkipReason> {
        self.keyword(index, default, HAlign::from_name, "expected left/center/right")
    }

    pub fn valign_or(&self, index: usize, default: VAlign) -> Result<VAlign, SkipReason> {
        self.keyword(index, default, VAlign::from_name, "expected top/center/bottom")
    }

    /// Optional keyword argument resolved through `lookup`.
    pub fn keyword<T>(
        &self,
        index: usize,
        default: T,
        lookup: impl Fn(&str) -> Option<T>,
        problem: &str,
    ) -> Result<T, SkipReason> {
        match self.raw(index) {
            Some(v) => lookup(v).ok_or_else(|| SkipReason::BadArgument {
                index,
                value: v.to_string(),
                problem: problem.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn out_of_range(&self, index: usize, value: i64, min: i64, max: i64) -> SkipReason {
        SkipReason::BadArgument {
            index,
            value: value.to_string(),
            problem: format!("must be between {min} and {max}"),
        }
    }
}

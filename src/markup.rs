//! `<img>` markup for `output = tag`.

use crate::params::ParameterSet;
use maud::{Markup, html};

/// Attributes of one rendered image tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImgTag<'a> {
    pub src: &'a str,
    pub width: u32,
    pub height: u32,
    pub alt: &'a str,
    pub title: Option<&'a str>,
    pub class: Option<&'a str>,
    pub id: Option<&'a str>,
}

impl<'a> ImgTag<'a> {
    /// Tag for `src` with the markup attributes of `params`.
    pub fn new(src: &'a str, (width, height): (u32, u32), params: &'a ParameterSet) -> Self {
        Self {
            src,
            width,
            height,
            alt: params.alt().unwrap_or(""),
            title: params.title(),
            class: params.class(),
            id: params.id(),
        }
    }

    pub fn render(&self) -> Markup {
        html! {
            img src=(self.src) width=(self.width) height=(self.height) alt=(self.alt)
                title=[self.title] class=[self.class] id=[self.id];
        }
    }
}

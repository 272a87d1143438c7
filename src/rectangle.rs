//! Page rectangles given relative to the page edges.
//!
//! A non-negative coordinate is measured from the origin, a negative one from
//! the opposite edge of the page.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rectangle {
    pub const EMPTY: Rectangle = Rectangle {
        left: 0.0,
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
    };

    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

fn compute_coordinate(coordinate: f64, limit: f64) -> f64 {
    if coordinate >= 0.0 {
        coordinate
    } else {
        limit + coordinate
    }
}

/// Resolves `rectangle` to absolute coordinates and flips the Y axis, so
/// that `top` and `bottom` are measured from the visual top of the page.
///
/// A missing rectangle resolves to [`Rectangle::EMPTY`].
pub fn compute_absolute_page_reverse_rectangle(
    rectangle: Option<&Rectangle>,
    page_size: Size,
) -> Rectangle {
    let Some(rectangle) = rectangle else {
        return Rectangle::EMPTY;
    };

    Rectangle {
        left: compute_coordinate(rectangle.left, page_size.width),
        top: page_size.height - compute_coordinate(rectangle.top, page_size.height),
        right: compute_coordinate(rectangle.right, page_size.width),
        bottom: page_size.height - compute_coordinate(rectangle.bottom, page_size.height),
    }
}

/// Resolves `rectangle` to absolute coordinates.
pub fn compute_absolute_page_rectangle(rectangle: Option<&Rectangle>, page_size: Size) -> Rectangle {
    let Some(rectangle) = rectangle else {
        return Rectangle::EMPTY;
    };

    Rectangle {
        left: compute_coordinate(rectangle.left, page_size.width),
        top: compute_coordinate(rectangle.top, page_size.height),
        right: compute_coordinate(rectangle.right, page_size.width),
        bottom: compute_coordinate(rectangle.bottom, page_size.height),
    }
}

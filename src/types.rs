//! Common 3D types shared by the geometry models and the scene projection.
//!
//! The backend reports every extent in centimeters along three named axes
//! (`width`, `depth`, `height`). Internally these map onto `x`, `y`, `z`.

use std::ops::{Add, Mul, Sub};

use serde::Serialize;
use utoipa::ToSchema;

/// Numerical tolerance for floating-point comparisons of extents.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Represents a 3D vector or point in a container's local frame.
///
/// # Examples
/// ```ignore
/// let corner = Vec3::new(10.0, 0.0, 5.0);
/// let size = Vec3::new(20.0, 20.0, 10.0);
/// let center = corner + size * 0.5;
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Creates a new 3D vector.
    ///
    /// # Parameters
    /// * `x` - X component (width)
    /// * `y` - Y component (depth)
    /// * `z` - Z component (height)
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Calculates the volume (product of all components).
    #[inline]
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Checks if all components are positive and finite.
    #[inline]
    pub fn is_valid_dimension(&self) -> bool {
        self.x > EPSILON_GENERAL
            && self.y > EPSILON_GENERAL
            && self.z > EPSILON_GENERAL
            && self.x.is_finite()
            && self.y.is_finite()
            && self.z.is_finite()
    }

    /// Checks if the vector fits within another vector (component-wise <=).
    #[inline]
    pub fn fits_within(&self, container: &Self, tolerance: f64) -> bool {
        self.x <= container.x + tolerance
            && self.y <= container.y + tolerance
            && self.z <= container.z + tolerance
    }

    /// Returns the midpoint between the origin and this point.
    #[inline]
    pub fn center(&self) -> Self {
        *self * 0.5
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

/// Trait for records with a 3D extent.
pub trait Dimensional {
    /// Returns the extent of the object.
    fn dimensions(&self) -> Vec3;

    /// Calculates the volume.
    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }
}

/// Represents an Axis-Aligned Bounding Box (AABB) between two corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl BoundingBox {
    /// Creates a new bounding box.
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Creates a bounding box from a corner and an extent.
    #[inline]
    pub fn from_position_and_dims(position: Vec3, dims: Vec3) -> Self {
        Self {
            min: position,
            max: position + dims,
        }
    }

    /// Returns the center point.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the dimensions (width, depth, height).
    #[inline]
    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }

    /// `true` when the max corner lies strictly beyond the min corner on every axis.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.dimensions().is_valid_dimension()
    }
}

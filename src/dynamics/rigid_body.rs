//! Inertial description of a single rigid body of the mechanism.

use crate::math::{cross_matrix, Matrix, Real, SpatialMatrix, Vector};

/// The mass properties of a rigid body, expressed in its own frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RigidBody {
    /// The body mass.
    pub mass: Real,
    /// The center of mass, expressed in body coordinates.
    pub local_com: Vector,
    /// The rotational inertia about the center of mass, in body coordinates.
    pub inertia: Matrix,
}

impl RigidBody {
    /// Creates a body from its mass, center of mass, and inertia about the
    /// center of mass.
    pub fn new(mass: Real, local_com: Vector, inertia: Matrix) -> Self {
        Self { mass, local_com, inertia }
    }

    /// A massless body, useful as an intermediate frame.
    pub fn massless() -> Self {
        Self {
            mass: 0.0,
            local_com: Vector::zeros(),
            inertia: Matrix::zeros(),
        }
    }

    /// The spatial inertia of this body about the body frame origin.
    pub fn spatial_inertia(&self) -> SpatialMatrix {
        let cx = cross_matrix(&self.local_com);
        let mut out = SpatialMatrix::zeros();
        out.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(self.inertia + cx * cx.transpose() * self.mass));
        out.fixed_view_mut::<3, 3>(0, 3).copy_from(&(cx * self.mass));
        out.fixed_view_mut::<3, 3>(3, 0)
            .copy_from(&(cx.transpose() * self.mass));
        out.fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(Matrix::identity() * self.mass));
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use na::vector;

    #[test]
    fn spatial_inertia_of_point_mass_at_origin() {
        let body = RigidBody::new(2.0, Vector::zeros(), Matrix::zeros());
        let inertia = body.spatial_inertia();
        let mut expected = SpatialMatrix::zeros();
        expected
            .fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(Matrix::identity() * 2.0));
        assert_relative_eq!(inertia, expected);
    }

    #[test]
    fn spatial_inertia_is_symmetric() {
        let body = RigidBody::new(
            1.5,
            vector![0.1, -0.3, 0.2],
            Matrix::from_diagonal(&vector![0.4, 0.5, 0.6]),
        );
        let inertia = body.spatial_inertia();
        assert_relative_eq!(inertia, inertia.transpose(), epsilon = 1.0e-12);
    }
}

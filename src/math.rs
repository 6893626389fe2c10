//! Elementary mathematical entities: the real scalar type and the 6D
//! spatial-algebra primitives used by the articulated-body algorithms.

use na::{Matrix3, Matrix6, Unit, Vector3, Vector6};

/// The scalar type used throughout the crate.
#[cfg(feature = "f32")]
pub type Real = f32;
/// The scalar type used throughout the crate.
#[cfg(feature = "f64")]
pub type Real = f64;

/// A 3D vector.
pub type Vector = Vector3<Real>;
/// A 3x3 matrix.
pub type Matrix = Matrix3<Real>;
/// A 6D spatial motion or force vector, laid out as `[angular; linear]`.
pub type SpatialVector = Vector6<Real>;
/// A 6x6 spatial matrix.
pub type SpatialMatrix = Matrix6<Real>;

/// The skew-symmetric cross-product matrix of `v`, such that
/// `cross_matrix(v) * w == v.cross(&w)`.
pub fn cross_matrix(v: &Vector) -> Matrix {
    Matrix::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// The spatial cross product of two motion vectors.
pub fn cross_motion(v: &SpatialVector, m: &SpatialVector) -> SpatialVector {
    let (vw, vl) = split(v);
    let (mw, ml) = split(m);
    join(&vw.cross(&mw), &(vw.cross(&ml) + vl.cross(&mw)))
}

/// The spatial cross product of a motion vector with a force vector.
pub fn cross_force(v: &SpatialVector, f: &SpatialVector) -> SpatialVector {
    let (vw, vl) = split(v);
    let (fw, fl) = split(f);
    join(&(vw.cross(&fw) + vl.cross(&fl)), &vw.cross(&fl))
}

#[inline]
pub(crate) fn split(v: &SpatialVector) -> (Vector, Vector) {
    (v.fixed_rows::<3>(0).into_owned(), v.fixed_rows::<3>(3).into_owned())
}

#[inline]
pub(crate) fn join(angular: &Vector, linear: &Vector) -> SpatialVector {
    SpatialVector::new(angular.x, angular.y, angular.z, linear.x, linear.y, linear.z)
}

/// A Plücker coordinate transform between body-fixed frames.
///
/// `rot` maps coordinates expressed in the source frame to the target frame
/// and `trans` is the position of the target frame origin expressed in the
/// source frame. Spatial vectors transformed by this type follow the
/// `[angular; linear]` layout of [`SpatialVector`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpatialTransform {
    /// Source-to-target rotation applied to coordinates.
    pub rot: Matrix,
    /// Target origin expressed in source coordinates.
    pub trans: Vector,
}

impl SpatialTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self { rot: Matrix::identity(), trans: Vector::zeros() }
    }

    /// A pure translation by `trans`.
    pub fn translation(trans: Vector) -> Self {
        Self { rot: Matrix::identity(), trans }
    }

    /// A pure rotation whose coordinate-mapping matrix is `rot`.
    pub fn rotation(rot: Matrix) -> Self {
        Self { rot, trans: Vector::zeros() }
    }

    /// A pure rotation of `angle` radians about `axis`.
    pub fn rotation_axis(angle: Real, axis: &Unit<Vector>) -> Self {
        // Coordinate mapping, hence the transpose of the rotation matrix.
        let rot = na::Rotation3::from_axis_angle(axis, angle);
        Self { rot: rot.matrix().transpose(), trans: Vector::zeros() }
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Self {
        Self { rot: self.rot.transpose(), trans: -(self.rot * self.trans) }
    }

    /// Applies the transform to a spatial motion vector.
    pub fn apply(&self, v: &SpatialVector) -> SpatialVector {
        let (w, l) = split(v);
        join(&(self.rot * w), &(self.rot * (l - self.trans.cross(&w))))
    }

    /// Applies the transpose of the transform to a spatial force vector,
    /// mapping a force expressed in the target frame back to the source
    /// frame.
    pub fn apply_transpose(&self, f: &SpatialVector) -> SpatialVector {
        let (n, l) = split(f);
        let lin = self.rot.transpose() * l;
        join(&(self.rot.transpose() * n + self.trans.cross(&lin)), &lin)
    }

    /// Applies the adjoint of the transform to a spatial force vector,
    /// mapping a force expressed in the source frame to the target frame.
    pub fn apply_adjoint(&self, f: &SpatialVector) -> SpatialVector {
        let (n, l) = split(f);
        join(&(self.rot * (n - self.trans.cross(&l))), &(self.rot * l))
    }

    /// The 6x6 matrix of this transform acting on motion vectors.
    pub fn to_matrix(&self) -> SpatialMatrix {
        let mut out = SpatialMatrix::zeros();
        out.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rot);
        out.fixed_view_mut::<3, 3>(3, 0)
            .copy_from(&(-self.rot * cross_matrix(&self.trans)));
        out.fixed_view_mut::<3, 3>(3, 3).copy_from(&self.rot);
        out
    }

    /// The 6x6 matrix of this transform acting on force vectors.
    pub fn to_matrix_adjoint(&self) -> SpatialMatrix {
        let mut out = SpatialMatrix::zeros();
        out.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rot);
        out.fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(-self.rot * cross_matrix(&self.trans)));
        out.fixed_view_mut::<3, 3>(3, 3).copy_from(&self.rot);
        out
    }

    /// The transpose of [`Self::to_matrix`].
    pub fn to_matrix_transpose(&self) -> SpatialMatrix {
        self.to_matrix().transpose()
    }

    /// Maps a point expressed in target coordinates to source coordinates.
    pub fn point_to_source(&self, point: &Vector) -> Vector {
        self.rot.transpose() * point + self.trans
    }
}

impl std::ops::Mul for SpatialTransform {
    type Output = SpatialTransform;

    fn mul(self, rhs: SpatialTransform) -> SpatialTransform {
        SpatialTransform {
            rot: self.rot * rhs.rot,
            trans: rhs.trans + rhs.rot.transpose() * self.trans,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use na::vector;

    fn arbitrary_transform() -> SpatialTransform {
        SpatialTransform::rotation_axis(0.83, &Unit::new_normalize(vector![0.2, -1.0, 0.4]))
            * SpatialTransform::translation(vector![0.3, -0.2, 1.1])
    }

    #[test]
    fn inverse_roundtrip() {
        let x = arbitrary_transform();
        let v = SpatialVector::new(0.1, -0.4, 0.2, 1.0, 2.0, -0.3);
        assert_relative_eq!(x.inverse().apply(&x.apply(&v)), v, epsilon = 1.0e-10);
    }

    #[test]
    fn matrix_forms_match_transform_application() {
        let x = arbitrary_transform();
        let v = SpatialVector::new(0.5, 0.1, -0.2, -1.0, 0.7, 0.3);
        assert_relative_eq!(x.to_matrix() * v, x.apply(&v), epsilon = 1.0e-10);
        assert_relative_eq!(x.to_matrix_adjoint() * v, x.apply_adjoint(&v), epsilon = 1.0e-10);
        assert_relative_eq!(x.to_matrix_transpose() * v, x.apply_transpose(&v), epsilon = 1.0e-10);
    }

    #[test]
    fn composition_matches_matrix_product() {
        let x1 = arbitrary_transform();
        let x2 = SpatialTransform::rotation_axis(-0.31, &Unit::new_normalize(vector![1.0, 0.1, 0.0]))
            * SpatialTransform::translation(vector![-0.5, 0.2, 0.0]);
        let composed = x1 * x2;
        assert_relative_eq!(
            composed.to_matrix(),
            x1.to_matrix() * x2.to_matrix(),
            epsilon = 1.0e-10
        );
    }

    #[test]
    fn motion_force_cross_duality() {
        // m . (v x* f) == -(v x m) . f
        let v = SpatialVector::new(0.3, -0.2, 0.5, 0.1, 0.9, -0.4);
        let m = SpatialVector::new(-0.6, 0.8, 0.2, 0.4, -0.1, 0.7);
        let f = SpatialVector::new(0.9, 0.3, -0.5, -0.2, 0.6, 0.1);
        assert_relative_eq!(
            m.dot(&cross_force(&v, &f)),
            -cross_motion(&v, &m).dot(&f),
            epsilon = 1.0e-12
        );
    }
}

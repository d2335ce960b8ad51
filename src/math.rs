//! 3D transforms and spherical geometry.
//!
//! Matrices are nalgebra column-vector `Matrix4<f64>`. [`Transform`]
//! appends operations in the order they are applied to a point, so a
//! chain reads the same way the frame composition is described:
//! translate, then scale, then rotate, and so on.

use nalgebra::{Matrix4, Point3, Rotation3, Vector3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform(pub Matrix4<f64>);

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// Applies `next` after everything already in the chain.
    pub fn then(self, next: Matrix4<f64>) -> Self {
        Self(next * self.0)
    }

    pub fn translate(self, offset: Vector3<f64>) -> Self {
        self.then(Matrix4::new_translation(&offset))
    }

    pub fn scale(self, factor: f64) -> Self {
        self.then(Matrix4::new_scaling(factor))
    }

    pub fn scale_xyz(self, factors: Vector3<f64>) -> Self {
        self.then(Matrix4::new_nonuniform_scaling(&factors))
    }

    pub fn rotate_x(self, angle: f64) -> Self {
        self.then(rotation_x(angle))
    }

    pub fn rotate_y(self, angle: f64) -> Self {
        self.then(rotation_y(angle))
    }

    pub fn rotate_z(self, angle: f64) -> Self {
        self.then(rotation_z(angle))
    }

    pub fn matrix(&self) -> Matrix4<f64> {
        self.0
    }
}

pub fn rotation_x(angle: f64) -> Matrix4<f64> {
    Rotation3::from_axis_angle(&Vector3::x_axis(), angle).to_homogeneous()
}

pub fn rotation_y(angle: f64) -> Matrix4<f64> {
    Rotation3::from_axis_angle(&Vector3::y_axis(), angle).to_homogeneous()
}

pub fn rotation_z(angle: f64) -> Matrix4<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), angle).to_homogeneous()
}

/// Roll about Z, then pitch about X, then yaw about Y. Radians.
pub fn rotation_yaw_pitch_roll(yaw: f64, pitch: f64, roll: f64) -> Matrix4<f64> {
    rotation_y(yaw) * rotation_x(pitch) * rotation_z(roll)
}

/// Orientation whose +Z axis points along `direction` with `up` as the
/// secondary axis. Returns `None` when the basis is degenerate.
pub fn face_towards(direction: &Vector3<f64>, up: &Vector3<f64>) -> Option<Matrix4<f64>> {
    let dir = direction.try_normalize(1e-12)?;
    let up = up.try_normalize(1e-12)?;
    if dir.cross(&up).norm() < 1e-12 {
        return None;
    }
    Some(Matrix4::face_towards(&Point3::origin(), &Point3::from(dir), &up))
}

pub fn transform_point(m: &Matrix4<f64>, p: &Vector3<f64>) -> Vector3<f64> {
    m.transform_point(&Point3::from(*p)).coords
}

/// Engine convention: Y is the polar axis, longitude 0 lies on -X.
pub fn geo_to_3d(lat_deg: f64, lng_deg: f64, radius: f64) -> Vector3<f64> {
    let lat = lat_deg.to_radians();
    let lng = (lng_deg + 180.0).to_radians();
    Vector3::new(
        lng.cos() * lat.cos() * radius,
        lat.sin() * radius,
        lng.sin() * lat.cos() * radius,
    )
}

/// Spherical linear interpolation between two unit vectors.
pub fn slerp(a: &Vector3<f64>, b: &Vector3<f64>, t: f64) -> Vector3<f64> {
    let dot = a.dot(b).clamp(-1.0, 1.0);
    let omega = dot.acos();
    if omega.abs() < 1e-9 {
        return a.lerp(b, t);
    }
    let sin_omega = omega.sin();
    a * (((1.0 - t) * omega).sin() / sin_omega) + b * ((t * omega).sin() / sin_omega)
}

/// Central angle between two lat/lng points, radians.
pub fn great_circle_angle(lat1_deg: f64, lng1_deg: f64, lat2_deg: f64, lng2_deg: f64) -> f64 {
    let (lat1, lat2) = (lat1_deg.to_radians(), lat2_deg.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lng2_deg - lng1_deg).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().min(1.0).asin()
}

/// `x,y,z` as written in saved files.
pub fn format_vector(v: &Vector3<f64>) -> String {
    format!("{},{},{}", v.x, v.y, v.z)
}

/// Inverse of [`format_vector`]; anything malformed reads as NaN.
pub fn parse_vector(text: &str) -> Vector3<f64> {
    let v: Vec<f64> = text
        .split(',')
        .map(|p| p.trim().parse().unwrap_or(f64::NAN))
        .collect();
    match v[..] {
        [x, y, z] => Vector3::new(x, y, z),
        _ => Vector3::repeat(f64::NAN),
    }
}

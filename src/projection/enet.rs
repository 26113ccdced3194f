use ndarray::{Array2, ArrayView1, ArrayViewMut1, Axis};

/// Radius of the elastic-net ball every dictionary row is kept in.
pub const RADIUS: f64 = 1.;

const BISECTION_STEPS: usize = 200;

/// Rows whose penalty exceeds the radius by less than this are considered inside the ball.
const BOUNDARY_TOL: f64 = 1e-12;

/// Elastic-net penalty of a row: `l1_ratio * |v|_1 + (1 - l1_ratio) * |v|_2^2`.
pub fn enet_norm(v: ArrayView1<f64>, l1_ratio: f64) -> f64 {
    let (l1, l2) = v
        .iter()
        .fold((0., 0.), |(l1, l2), x| (l1 + x.abs(), l2 + x * x));

    l1_ratio * l1 + (1. - l1_ratio) * l2
}

/// Projects `v` in place onto the elastic-net ball `{x : enet_norm(x) <= radius}`.
///
/// Rows already inside the ball (up to rounding) are left untouched. Otherwise the Euclidean projection is
/// `soft(v, mu * l1_ratio) / (1 + 2 * mu * (1 - l1_ratio))` for the single `mu > 0` that lands
/// on the boundary, found in closed form for a pure L2 ball and by bisection otherwise.
///
/// # Arguments
/// * `v` - The row to project.
/// * `radius` - The radius of the ball, non-positive radii collapse the row to zero.
/// * `l1_ratio` - The elastic-net mix.
pub fn enet_projection(mut v: ArrayViewMut1<f64>, radius: f64, l1_ratio: f64) {
    if enet_norm(v.view(), l1_ratio) <= radius + BOUNDARY_TOL * radius.max(1.) {
        return;
    }

    if radius <= 0. {
        v.fill(0.);
        return;
    }

    if l1_ratio == 0. {
        let sq_norm = v.iter().fold(0., |acc, x| acc + x * x);
        let scale = (radius / sq_norm).sqrt();
        v.mapv_inplace(|x| x * scale);
        return;
    }

    let shrink = |x: f64, mu: f64| {
        let thresholded = (x.abs() - mu * l1_ratio).max(0.);
        x.signum() * thresholded / (1. + 2. * mu * (1. - l1_ratio))
    };

    let penalty = |mu: f64| {
        v.iter().fold(0., |acc, &x| {
            let y = shrink(x, mu);
            acc + l1_ratio * y.abs() + (1. - l1_ratio) * y * y
        })
    };

    // Every entry is thresholded away at `hi`, so `penalty(hi) == 0 <= radius`.
    let mut lo = 0.;
    let mut hi = v.iter().fold(0f64, |acc, x| acc.max(x.abs())) / l1_ratio;

    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }

        if penalty(mid) > radius {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    v.mapv_inplace(|x| shrink(x, hi));
}

/// Rescales a non-zero row so that its elastic-net penalty equals `radius`.
///
/// Zero rows are left untouched.
pub fn enet_scale(mut v: ArrayViewMut1<f64>, radius: f64, l1_ratio: f64) {
    let (l1, l2) = v
        .iter()
        .fold((0., 0.), |(l1, l2), x| (l1 + x.abs(), l2 + x * x));

    // Solves `a * s^2 + b * s = radius` for the scale `s > 0`.
    let a = (1. - l1_ratio) * l2;
    let b = l1_ratio * l1;

    let scale = if a > 0. {
        (-b + (b * b + 4. * a * radius).sqrt()) / (2. * a)
    } else if b > 0. {
        radius / b
    } else {
        return;
    };

    v.mapv_inplace(|x| x * scale);
}

/// Returns a copy of `d` with every row rescaled onto the elastic-net sphere.
pub fn scaled_rows(d: &Array2<f64>, radius: f64, l1_ratio: f64) -> Array2<f64> {
    let mut scaled = d.clone();

    for row in scaled.axis_iter_mut(Axis(0)) {
        enet_scale(row, radius, l1_ratio);
    }

    scaled
}

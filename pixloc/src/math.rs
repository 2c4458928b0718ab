/// Bracketed univariate root finder.
///
/// Maintains a sign-change bracket and refines it with inverse
/// polynomial interpolation through the most recent evaluations (up to
/// order 5), falling back to bisection whenever the interpolated
/// candidate leaves the bracket or stalls. The initial bracket is
/// searched among `[lo, start]` and `[start, hi]`.
///
/// Returns `None` when no sign change exists on `[lo, hi]` or the
/// evaluation budget runs out before the bracket shrinks below
/// `accuracy`. Non-finite function values poison the bracket search and
/// also yield `None`.
pub fn bracketed_root<F>(
    mut f: F,
    lo: f64,
    hi: f64,
    start: f64,
    max_eval: usize,
    accuracy: f64,
) -> Option<f64>
where
    F: FnMut(f64) -> f64,
{
    let start = start.clamp(lo, hi);
    let mut used = 0;

    let fs = f(start);
    used += 1;
    if fs == 0.0 {
        return Some(start);
    }
    let fl = f(lo);
    used += 1;
    if fl == 0.0 {
        return Some(lo);
    }

    let (mut a, mut fa, mut b, mut fb);
    if fl * fs < 0.0 {
        (a, fa, b, fb) = (lo, fl, start, fs);
    } else {
        let fh = f(hi);
        used += 1;
        if fh == 0.0 {
            return Some(hi);
        }
        if fs * fh < 0.0 {
            (a, fa, b, fb) = (start, fs, hi, fh);
        } else if fl * fh < 0.0 {
            // non-monotonic function, outer bracket still works
            (a, fa, b, fb) = (lo, fl, hi, fh);
        } else {
            return None;
        }
    }

    let mut xs = vec![a, b];
    let mut ys = vec![fa, fb];

    loop {
        if (b - a).abs() <= accuracy {
            // secant estimate inside the converged bracket
            let x = a - fa * (b - a) / (fb - fa);
            return Some(x.clamp(a.min(b), a.max(b)));
        }
        if used >= max_eval {
            return None;
        }

        let mid = 0.5 * (a + b);
        let mut x = inverse_interpolate(&xs, &ys);
        if !x.is_finite() || x <= a.min(b) || x >= a.max(b) {
            x = mid;
        }
        // keep a minimal step away from the endpoints
        let margin = 0.01 * (b - a).abs();
        if (x - a).abs() < margin || (x - b).abs() < margin {
            x = mid;
        }

        let fx = f(x);
        used += 1;
        if fx == 0.0 {
            return Some(x);
        }
        if !fx.is_finite() {
            return None;
        }
        if fa * fx < 0.0 {
            (b, fb) = (x, fx);
        } else {
            (a, fa) = (x, fx);
        }
        xs.push(x);
        ys.push(fx);
        if xs.len() > 6 {
            xs.remove(0);
            ys.remove(0);
        }
    }
}

/// Evaluate at `y = 0` the Newton interpolation polynomial of x as a
/// function of y. NaN when two ordinates coincide.
fn inverse_interpolate(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len();
    let mut coeffs = xs.to_vec();
    for j in 1..n {
        for i in (j..n).rev() {
            let dy = ys[i] - ys[i - j];
            if dy == 0.0 {
                return f64::NAN;
            }
            coeffs[i] = (coeffs[i] - coeffs[i - 1]) / dy;
        }
    }
    let mut x = coeffs[n - 1];
    for i in (0..n - 1).rev() {
        x = coeffs[i] - x * ys[i];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::bracketed_root;
    use approx::assert_relative_eq;

    #[test]
    fn test_cubic_root() {
        let root = bracketed_root(|x| x * x * x - 2.0, 0.0, 4.0, 1.0, 100, 1e-12).unwrap();
        assert_relative_eq!(root, 2.0f64.cbrt(), epsilon = 1e-10);
    }

    #[test]
    fn test_transcendental_root() {
        let root = bracketed_root(|x| x.cos() - x, 0.0, 2.0, 0.3, 100, 1e-12).unwrap();
        assert_relative_eq!(root.cos(), root, epsilon = 1e-10);
    }

    #[test]
    fn test_no_bracket() {
        assert!(bracketed_root(|x| x * x + 1.0, -5.0, 5.0, 0.0, 100, 1e-12).is_none());
    }

    #[test]
    fn test_budget_exhausted() {
        assert!(bracketed_root(|x| x * x * x - 7.0, 0.0, 1.0e9, 1.0, 4, 1e-12).is_none());
    }

    #[test]
    fn test_interpolation_converges_fast() {
        // a smooth function should need far fewer evaluations than
        // bisection to reach 1e-12 on a unit-sized bracket
        let mut count = 0;
        let root = bracketed_root(
            |x| {
                count += 1;
                (x - 0.3).exp() - 1.0
            },
            0.0,
            1.0,
            0.9,
            100,
            1e-12,
        )
        .unwrap();
        assert_relative_eq!(root, 0.3, epsilon = 1e-10);
        assert!(count < 20, "took {count} evaluations");
    }

    #[test]
    fn test_nan_function_value() {
        assert!(
            bracketed_root(|x| if x > 0.5 { f64::NAN } else { x - 0.7 }, 0.0, 1.0, 0.2, 100, 1e-12)
                .is_none()
        );
    }
}

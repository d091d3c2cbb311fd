use {super::*, approx::assert_abs_diff_eq};

fn signal(n: usize) -> Array1<f64> {
    Array1::from_shape_fn(n, |i| {
        let x = i as f64 / n as f64;
        (2.0 * PI * x).sin() + 0.3 * (6.0 * PI * x).cos() + 0.1 * x
    })
}

#[test]
fn modes_are_nyquist_limited() {
    assert_eq!(Fft1d::new(8).modes(), 5);
    assert_eq!(Fft1d::new(9).modes(), 5);
    assert_eq!(Fft1d::new(1).modes(), 1);
}

#[test]
fn roundtrip_64() {
    let fft = Fft1d::new(64);
    let x = signal(64);

    let back = fft.spctop(fft.ptospc(x.view()).view());

    let err = (&back - &x).iter().fold(0.0f64, |m, e| m.max(e.abs()));
    assert!(err < 1.0E-5, "max abs error {}", err);
}

#[test]
fn roundtrip_odd_length() {
    let fft = Fft1d::new(45);
    let x = signal(45);

    let back = fft.spctop(fft.ptospc(x.view()).view());

    assert_abs_diff_eq!(back, x, epsilon = 1.0E-12);
}

#[test]
fn constant_signal_has_only_dc() {
    let fft = Fft1d::new(16);
    let xs = fft.ptospc(Array1::from_elem(16, 3.0).view());

    assert_abs_diff_eq!(xs[0].re, 48.0, epsilon = 1.0E-12);
    for c in xs.iter().skip(1) {
        assert!(c.norm() < 1.0E-12);
    }
}

#[test]
fn single_cosine_mode() {
    let n = 32;
    let fft = Fft1d::new(n);
    let x = Array1::from_shape_fn(n, |i| (2.0 * PI * 3.0 * i as f64 / n as f64).cos());

    let xs = fft.ptospc(x.view());

    assert_abs_diff_eq!(xs[3].re, n as f64 / 2.0, epsilon = 1.0E-10);
    assert_abs_diff_eq!(xs[3].im, 0.0, epsilon = 1.0E-10);
}

#[test]
fn imaginary_dc_is_ignored() {
    let fft = Fft1d::new(8);
    let mut xs = Array1::from_elem(5, Complex64::new(0.0, 0.0));
    xs[0] = Complex64::new(8.0, 5.0);
    xs[4] = Complex64::new(0.0, 7.0);

    assert_abs_diff_eq!(fft.spctop(xs.view()), Array1::from_elem(8, 1.0), epsilon = 1.0E-12);
}

#[test]
fn ifft_real_matches_spctop_for_hermitian_input() {
    let n = 12;
    let fft = Fft1d::new(n);
    let x = signal(n);
    let half = fft.ptospc(x.view());

    let mut full = Array1::from_elem(n, Complex64::new(0.0, 0.0));
    for k in 0..half.len() {
        full[k] = half[k];
        if k > 0 && k < n - k {
            full[n - k] = half[k].conj();
        }
    }

    assert_abs_diff_eq!(fft.ifft_real(full.view()), x, epsilon = 1.0E-12);
}

#[test]
fn wavenumber_ordering() {
    assert_eq!(
        Fft1d::new(6).wavenumbers().to_vec(),
        vec![0.0, 1.0, 2.0, -3.0, -2.0, -1.0]
    );
    assert_eq!(
        Fft1d::new(5).wavenumbers().to_vec(),
        vec![0.0, 1.0, 2.0, -2.0, -1.0]
    );
}

#[test]
fn multiplicity_of_modes() {
    let even = Fft1d::new(8);
    assert_eq!(even.multiplicity(0), 1.0);
    assert_eq!(even.multiplicity(2), 2.0);
    assert_eq!(even.multiplicity(4), 1.0);

    assert_eq!(Fft1d::new(7).multiplicity(3), 2.0);
}

#[test]
fn shared_plans_are_reused() {
    let a = Fft1d::shared(24);
    let b = Fft1d::shared(24);

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.len(), 24);
    assert_eq!(Fft1d::shared(25).len(), 25);
}

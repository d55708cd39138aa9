#[cfg(test)]
mod units {
    use crate::subspace::{sklm, AppearanceModel};
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    const DIM: usize = 16;

    fn template(seed: usize) -> DVector<f32> {
        // Deterministic, linearly independent-ish test vectors
        DVector::from_fn(DIM, |i, _| ((i * 7 + seed * 13) % 11) as f32 / 10.0 + seed as f32 * 0.01)
    }

    fn assert_orthonormal(basis: &DMatrix<f32>, tolerance: f32) {
        let gram = basis.transpose() * basis;
        let identity = DMatrix::<f32>::identity(basis.ncols(), basis.ncols());
        let deviation = (gram - identity).abs().max();
        assert!(
            deviation < tolerance,
            "basis deviates from orthonormality by {}",
            deviation
        );
    }

    fn assert_non_increasing(eigval: &DVector<f32>) {
        for window in eigval.as_slice().windows(2) {
            assert!(
                window[0] >= window[1],
                "singular values not sorted: {} < {}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn first_batch_builds_model_from_scratch() {
        let model = AppearanceModel::empty(DIM);
        let batch: Vec<DVector<f32>> = (0..4).map(template).collect();

        let update = sklm(&batch, &model, 0.95).expect("update succeeds");

        // Mean equals the batch mean
        let expected_mean = batch
            .iter()
            .fold(DVector::zeros(DIM), |sum, template| sum + template)
            / 4.0;
        assert_relative_eq!(update.mean, expected_mean, epsilon = 1e-5);

        assert_eq!(update.nsamples, 4.0);
        assert_orthonormal(&update.basis, 1e-4);
        assert_non_increasing(&update.eigval);
    }

    #[test]
    fn incremental_updates_keep_the_basis_orthonormal() {
        let mut model = AppearanceModel::empty(DIM);

        for round in 0..5 {
            let batch: Vec<DVector<f32>> = (0..3).map(|i| template(round * 3 + i)).collect();
            let update = sklm(&batch, &model, 0.95).expect("update succeeds");
            model.apply(update);

            assert_orthonormal(model.basis(), 1e-4);
            assert_non_increasing(model.eigval());
            assert_eq!(model.basis().ncols(), model.eigval().len());
        }
    }

    #[test]
    fn effective_sample_count_follows_the_forgetting_recurrence() {
        let mut model = AppearanceModel::empty(DIM);
        let forgetting = 0.9;

        let batch: Vec<DVector<f32>> = (0..5).map(template).collect();
        model.apply(sklm(&batch, &model, forgetting).expect("first update"));
        assert_eq!(model.nsamples(), 5.0);

        let batch: Vec<DVector<f32>> = (5..10).map(template).collect();
        model.apply(sklm(&batch, &model, forgetting).expect("second update"));
        assert_relative_eq!(model.nsamples(), 5.0 + forgetting * 5.0, epsilon = 1e-5);
    }

    #[test]
    fn mean_update_weighs_old_and_new_samples() {
        let mut model = AppearanceModel::empty(DIM);
        let forgetting = 0.5;

        let first: Vec<DVector<f32>> = vec![DVector::from_element(DIM, 1.0)];
        model.apply(sklm(&first, &model, forgetting).expect("first update"));

        let second: Vec<DVector<f32>> = vec![DVector::from_element(DIM, 3.0)];
        let update = sklm(&second, &model, forgetting).expect("second update");

        // f*n = 0.5, m = 1 => weights 1/3 old and 2/3 new
        let expected = 1.0 / 3.0 * 1.0 + 2.0 / 3.0 * 3.0;
        for value in update.mean.iter() {
            assert_relative_eq!(*value, expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn reconstruction_is_exact_within_the_span() {
        let mut model = AppearanceModel::empty(DIM);
        let batch: Vec<DVector<f32>> = (0..4).map(template).collect();
        model.apply(sklm(&batch, &model, 1.0).expect("update succeeds"));

        for sample in &batch {
            let coef = model.project(sample);
            let reconstructed = model.reconstruct(&coef);
            assert_relative_eq!(reconstructed, sample.clone(), epsilon = 1e-4);
        }
    }

    #[test]
    fn truncation_folds_tail_energy_into_residual() {
        let mut model = AppearanceModel::empty(DIM);
        let batch: Vec<DVector<f32>> = (0..6).map(template).collect();
        model.apply(sklm(&batch, &model, 0.95).expect("update succeeds"));

        let rank = model.rank();
        assert!(rank > 2, "test needs a few basis columns, got {}", rank);

        let tail: f32 = model
            .eigval()
            .iter()
            .skip(2)
            .map(|sigma| sigma * sigma)
            .sum();

        let truncated = model.truncate(2, 0.95);
        assert!(truncated);
        assert_eq!(model.rank(), 2);
        assert_eq!(model.eigval().len(), 2);
        assert_relative_eq!(model.residual(), tail, epsilon = 1e-5);

        // A second call below the cap is a no-op
        assert!(!model.truncate(2, 0.95));
        assert_relative_eq!(model.residual(), tail, epsilon = 1e-5);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let model = AppearanceModel::empty(DIM);
        assert!(sklm(&[], &model, 0.95).is_err());
    }

    #[test]
    fn mismatched_template_length_is_rejected() {
        let model = AppearanceModel::empty(DIM);
        let batch = vec![DVector::from_element(DIM + 1, 0.5)];
        assert!(sklm(&batch, &model, 0.95).is_err());
    }
}

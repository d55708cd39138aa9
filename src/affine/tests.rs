#[cfg(test)]
mod units {
    use crate::affine::AffineState;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn initial_state_maps_size_to_scale() {
        let state = AffineState::initial(320.0, 240.0, 40.0, 32);

        assert_eq!(state.cx, 320.0);
        assert_eq!(state.cy, 240.0);
        assert_relative_eq!(state.scale, 1.25);
        assert_eq!(state.aspect, 1.0);
        assert_eq!(state.angle, 0.0);
    }

    #[test]
    fn window_applies_scale_then_aspect() {
        let state = AffineState {
            cx: 0.0,
            cy: 0.0,
            scale: 2.0,
            aspect: 0.5,
            angle: 0.0,
        };

        let (width, height) = state.window(32);
        assert_relative_eq!(width, 64.0);
        assert_relative_eq!(height, 32.0);
        assert_relative_eq!(state.target_size(32), 32.0);
    }

    #[test]
    fn zero_sigma_diffusion_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let state = AffineState::initial(10.0, 20.0, 16.0, 32);

        let diffused = state.diffused(&[0.0; 5], &mut rng);
        assert_eq!(diffused, state);
    }

    #[test]
    fn diffusion_moves_only_components_with_sigma() {
        let mut rng = StdRng::seed_from_u64(2);
        let state = AffineState::initial(10.0, 20.0, 16.0, 32);

        let diffused = state.diffused(&[5.0, 0.0, 0.0, 0.0, 0.0], &mut rng);
        assert_ne!(diffused.cx, state.cx);
        assert_eq!(diffused.cy, state.cy);
        assert_eq!(diffused.scale, state.scale);
        assert_eq!(diffused.angle, state.angle);
    }

    #[test]
    fn nan_states_are_not_finite() {
        let mut state = AffineState::initial(0.0, 0.0, 8.0, 32);
        assert!(state.is_finite());

        state.scale = f32::NAN;
        assert!(!state.is_finite());
    }
}

use approx::assert_abs_diff_eq;
use bbox::{prelude::*, HW, TLBR};
use label::Label;
use noisy_float::prelude::*;
use rand::prelude::*;
use rpn::{
    AnchorGeneratorInit, AnchorSet, FeatureShape, ImageLabels, LabelSamplerInit, MatchLabel,
    TargetAssigner, TargetAssignerInit,
};
use std::sync::Arc;

fn rect(tlbr: [f64; 4]) -> TLBR<f64> {
    TLBR::try_from_tlbr(tlbr).unwrap()
}

fn label(tlbr: [f64; 4], class: usize) -> Label<TLBR<f64>, usize> {
    Label {
        rect: rect(tlbr),
        class,
    }
}

fn small_assigner(num_samples: usize) -> TargetAssigner {
    TargetAssignerInit {
        anchor: AnchorGeneratorInit {
            stride: r64(16.0),
            scales: vec![r64(16.0), r64(32.0)],
            ratios: vec![r64(1.0)],
        },
        sampler: LabelSamplerInit {
            num_samples,
            ..Default::default()
        },
        ..Default::default()
    }
    .build()
    .unwrap()
}

#[test]
fn single_confident_match() {
    let anchors = Arc::new(AnchorSet::from_anchors(vec![
        rect([0.0, 0.0, 10.0, 10.0]),
        rect([0.0, 20.0, 10.0, 30.0]),
        rect([20.0, 0.0, 30.0, 10.0]),
        rect([40.0, 40.0, 50.0, 50.0]),
    ]));
    let gts = vec![label([0.0, 0.0, 10.0, 8.0], 0)];
    let assigner = TargetAssignerInit::default().build().unwrap();
    let mut rng = StdRng::seed_from_u64(0);

    let targets = assigner
        .assign_with_anchors(anchors.clone(), HW::from_hw([64, 64]), &gts, &mut rng)
        .unwrap();

    assert_eq!(
        targets.labels,
        [
            MatchLabel::Positive(0),
            MatchLabel::Background,
            MatchLabel::Background,
            MatchLabel::Background,
        ]
    );
    assert_eq!(targets.num_positives(), 1);
    assert_eq!(targets.num_negatives(), 3);
    assert_eq!(targets.regression_targets.dim(), (4, 4));

    let row = targets.regression_targets.row(0);
    let decoded = assigner
        .coder()
        .decode(&anchors.anchors()[0], [row[0], row[1], row[2], row[3]])
        .unwrap();
    for (lhs, rhs) in decoded.tlbr().iter().zip(gts[0].rect.tlbr()) {
        assert_abs_diff_eq!(*lhs, rhs, epsilon = 1e-9);
    }
    for index in 1..4 {
        assert_eq!(targets.regression_targets.row(index).to_vec(), [0.0; 4]);
    }
}

#[test]
fn empty_ground_truth() {
    let assigner = small_assigner(256);
    let shape = FeatureShape::from_dims(&[256, 4, 5]).unwrap();
    let gts: Vec<Label<TLBR<f64>, usize>> = vec![];
    let mut rng = StdRng::seed_from_u64(0);

    let targets = assigner
        .assign(&shape, HW::from_hw([64, 80]), &gts, &mut rng)
        .unwrap();

    assert_eq!(targets.anchors.len(), 4 * 5 * 2);
    assert!(targets
        .labels
        .iter()
        .all(|label| *label == MatchLabel::Background));
    assert_eq!(targets.regression_targets.dim(), (0, 4));
    assert!(targets.class_targets.iter().all(Option::is_none));
}

#[test]
fn exact_anchor_match_from_feature_shape() {
    let assigner = small_assigner(256);
    let shape = FeatureShape::from_dims(&[1, 256, 4, 5]).unwrap();
    // cell (1, 2) with scale 16 covers exactly this box
    let gts = vec![label([16.0, 32.0, 32.0, 48.0], 7)];
    let mut rng = StdRng::seed_from_u64(0);

    let targets = assigner
        .assign(&shape, HW::from_hw([64, 80]), &gts, &mut rng)
        .unwrap();

    let expect_index = (5 + 2) * 2;
    assert_eq!(targets.positive_indices(), [expect_index]);
    assert_eq!(targets.class_targets[expect_index], Some(7));
    assert_eq!(
        targets.regression_targets.row(expect_index).to_vec(),
        [0.0; 4]
    );
}

fn batch() -> Vec<ImageLabels<usize>> {
    let shape = FeatureShape::from_dims(&[256, 4, 5]).unwrap();
    let size = HW::from_hw([64, 80]);
    vec![
        ImageLabels {
            feature_shape: shape,
            image_size: size,
            labels: vec![label([0.0, 0.0, 30.0, 30.0], 1)],
        },
        ImageLabels {
            feature_shape: shape,
            image_size: size,
            labels: vec![],
        },
        ImageLabels {
            feature_shape: shape,
            image_size: size,
            labels: vec![
                label([16.0, 16.0, 48.0, 48.0], 2),
                label([30.0, 40.0, 62.0, 72.0], 3),
            ],
        },
    ]
}

#[test]
fn batch_assignment_is_reproducible() {
    let assigner = small_assigner(8);
    let items = batch();

    let lhs = assigner.assign_batch(&items, 42).unwrap();
    let rhs = assigner.assign_batch(&items, 42).unwrap();
    assert_eq!(lhs.len(), items.len());

    for (index, ((lhs, rhs), item)) in lhs.iter().zip(&rhs).zip(&items).enumerate() {
        assert_eq!(lhs.labels, rhs.labels);
        assert_eq!(lhs.regression_targets, rhs.regression_targets);
        assert!(lhs.num_positives() + lhs.num_negatives() <= 8);

        let mut rng = StdRng::seed_from_u64(42 + index as u64);
        let single = assigner
            .assign(&item.feature_shape, item.image_size, &item.labels, &mut rng)
            .unwrap();
        assert_eq!(lhs.labels, single.labels);
        assert_eq!(lhs.class_targets, single.class_targets);
    }

    assert_eq!(lhs[1].regression_targets.dim(), (0, 4));
    assert!(lhs[0].num_positives() >= 1);
}

#[test]
fn batch_shares_cached_anchors() {
    let assigner = small_assigner(8);
    let targets = assigner.assign_batch(&batch(), 0).unwrap();
    assert!(Arc::ptr_eq(&targets[0].anchors, &targets[1].anchors));
    assert!(Arc::ptr_eq(&targets[1].anchors, &targets[2].anchors));
}

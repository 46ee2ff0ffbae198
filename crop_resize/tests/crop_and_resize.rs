//! End-to-end checks of the public ops.

use std::path::PathBuf;

use common::float_ext::FloatExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::runtime::Handle;

use crop_resize::{
    CropAndResize, CropAndResizeGradBoxes, CropAndResizeGradImage, CropInputs, Execution,
    OpAttrs, Rank, Tensor,
};

fn random_tensor(shape: Vec<usize>, lo: f32, hi: f32, seed: u64) -> Tensor<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let len = shape.iter().product();
    Tensor::new(shape, (0..len).map(|_| rng.random_range(lo..hi)).collect())
}

fn dot(a: &Tensor<f32>, b: &Tensor<f32>) -> f64 {
    a.data()
        .iter()
        .zip(b.data())
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum()
}

fn attrs_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("crop_resize_{}_{}", std::process::id(), name));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn two_by_two_image() {
    let op = CropAndResize::new(Rank::Two, &OpAttrs::default()).unwrap();
    let image = Tensor::new(vec![1, 2, 2, 1], vec![1.0f32, 2.0, 3.0, 4.0]);
    let index = Tensor::vector(vec![0]);

    let cases: [([f32; 4], [i32; 2], &[f32]); 3] = [
        ([0.0, 0.0, 1.0, 1.0], [2, 2], &[1.0, 2.0, 3.0, 4.0]),
        ([0.0, 0.0, 0.0, 0.0], [1, 1], &[1.0]),
        ([-1.0, -1.0, -1.0, -1.0], [1, 1], &[0.0]),
    ];
    for (row, crop, expected) in cases {
        let crops = op
            .compute(
                &image,
                &Tensor::new(vec![1, 4], row.to_vec()),
                &index,
                &Tensor::vector(crop.to_vec()),
            )
            .unwrap();
        assert_eq!(crops.data(), expected, "box {row:?}");
    }
}

#[test]
fn attrs_loaded_from_yaml_file() {
    let path = attrs_file("attrs.yaml", "method: bilinear\nextrapolation_value: 7.5\n");
    let attrs = OpAttrs::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let op = CropAndResize::new(Rank::Two, &attrs).unwrap();
    let crops = op
        .compute(
            &Tensor::new(vec![1, 2, 2, 1], vec![1.0f32, 2.0, 3.0, 4.0]),
            &Tensor::new(vec![1, 4], vec![2.0, 2.0, 3.0, 3.0]),
            &Tensor::vector(vec![0]),
            &Tensor::vector(vec![2, 2]),
        )
        .unwrap();
    assert_eq!(crops.data(), &[7.5; 4]);
}

#[test]
fn attrs_with_wrong_method_are_rejected() {
    let path = attrs_file("attrs.json", r#"{"method": "bilinear"}"#);
    let attrs = OpAttrs::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let err = CropAndResize::new(Rank::Three, &attrs).unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(OpAttrs::load(&PathBuf::from("attrs.toml"))
        .unwrap_err()
        .is_invalid_argument());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn out_of_range_index_fails_in_every_mode() {
    let op = CropAndResize::new(Rank::Two, &OpAttrs::default()).unwrap();
    let inputs = CropInputs::new(
        Tensor::new(vec![2, 2, 2, 1], vec![0.0f32; 8]),
        Tensor::new(vec![2, 4], vec![0.0, 0.0, 1.0, 1.0, 5.0, 5.0, 6.0, 6.0]),
        Tensor::vector(vec![1, 2]),
        Tensor::vector(vec![2, 2]),
    );

    let immediate = op
        .compute(&inputs.image, &inputs.boxes, &inputs.box_index, &inputs.crop_size)
        .unwrap_err();
    assert!(immediate.is_out_of_range());

    let (tx, rx) = tokio::sync::oneshot::channel();
    op.compute_async(&Execution::Immediate, inputs.clone(), move |result| {
        let _ = tx.send(result);
    });
    assert!(rx.await.unwrap().unwrap_err().is_out_of_range());

    let deferred = op
        .compute_deferred(Handle::current(), inputs)
        .await
        .unwrap_err();
    assert_eq!(deferred, immediate);
}

#[test]
fn image_gradient_matches_finite_differences() {
    let attrs = OpAttrs::default();
    let forward = CropAndResize::new(Rank::Two, &attrs).unwrap();
    let backward = CropAndResizeGradImage::<f64>::new(Rank::Two, &attrs).unwrap();

    let mut image = random_tensor(vec![1, 4, 5, 2], -1.0, 1.0, 1);
    let boxes = Tensor::new(vec![2, 4], vec![0.1, 0.05, 0.8, 0.9, 0.7, 0.6, 0.2, 0.3]);
    let index = Tensor::vector(vec![0, 0]);
    let crop_size = Tensor::vector(vec![3, 4]);
    let grads = random_tensor(vec![2, 3, 4, 2], -1.0, 1.0, 2);

    let analytic = backward
        .compute(&grads, &boxes, &index, &Tensor::vector(vec![1, 4, 5, 2]))
        .unwrap();

    let eps = 1e-2f32;
    for i in [0, 3, 9, 17, 22, 39] {
        let original = image.data()[i];
        image.data_mut()[i] = original + eps;
        let plus = dot(&forward.compute(&image, &boxes, &index, &crop_size).unwrap(), &grads);
        image.data_mut()[i] = original - eps;
        let minus = dot(&forward.compute(&image, &boxes, &index, &crop_size).unwrap(), &grads);
        image.data_mut()[i] = original;

        let numeric = (plus - minus) / (2.0 * eps as f64);
        assert!(
            analytic.data()[i].approximately_eq_rel(numeric, 1e-3),
            "sample {i}: analytic {} vs numeric {numeric}",
            analytic.data()[i]
        );
    }
}

#[test]
fn box_gradient_matches_finite_differences_3d() {
    let attrs = OpAttrs::for_rank(Rank::Three);
    let forward = CropAndResize::new(Rank::Three, &attrs).unwrap();
    let backward = CropAndResizeGradBoxes::new(Rank::Three, &attrs).unwrap();

    let volume = random_tensor(vec![1, 4, 5, 6, 2], -1.0, 1.0, 3);
    // every sample coordinate stays at least 0.05 away from an integer
    let rows = [0.15f32, 0.3, 0.62, 0.85, 0.9, 0.14];
    let index = Tensor::vector(vec![0]);
    let crop_size = Tensor::vector(vec![2, 3, 3]);
    let grads = random_tensor(vec![1, 2, 3, 3, 2], -1.0, 1.0, 4);

    let analytic = backward
        .compute(&grads, &volume, &Tensor::new(vec![1, 6], rows.to_vec()), &index)
        .unwrap();

    let eps = 5e-3f32;
    let loss = |rows: [f32; 6]| {
        let crops = forward
            .compute(&volume, &Tensor::new(vec![1, 6], rows.to_vec()), &index, &crop_size)
            .unwrap();
        dot(&crops, &grads)
    };
    for i in 0..6 {
        let (mut plus, mut minus) = (rows, rows);
        plus[i] += eps;
        minus[i] -= eps;
        let numeric = (loss(plus) - loss(minus)) / (2.0 * eps as f64);

        assert!(
            (analytic.data()[i] as f64).approximately_eq_rel(numeric, 1e-2),
            "column {i}: analytic {} vs numeric {numeric}",
            analytic.data()[i]
        );
    }
}

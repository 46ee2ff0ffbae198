use super::*;

#[test]
fn test_in_batch_bounds() {
    assert!(in_batch(0, 1));
    assert!(in_batch(2, 3));
    assert!(!in_batch(3, 3));
    assert!(!in_batch(-1, 3));
    assert!(!in_batch(0, 0));
}

#[test]
fn test_check_accepts_valid_and_empty() {
    assert!(check_box_index(&[0, 1, 2, 1], 3).is_ok());
    assert!(check_box_index(&[], 0).is_ok());
}

#[test]
fn test_check_rejects_out_of_range() {
    let err = check_box_index(&[0, 3, 1], 3).unwrap_err();
    assert!(err.is_out_of_range());
    let err = check_box_index(&[-1], 3).unwrap_err();
    assert!(err.is_out_of_range());
}

#[test]
fn test_parallel_reduction_agrees_with_scan() {
    let mut index: Vec<i32> = (0..10_000).map(|i| i % 7).collect();
    assert!(box_index_is_valid(&index, 7));
    index[9_876] = 7;
    assert!(!box_index_is_valid(&index, 7));
    assert!(check_box_index(&index, 7).is_err());
}

#[tokio::test]
async fn test_deferred_check_valid() {
    let index = Arc::new(Tensor::vector(vec![0, 1, 1, 0]));
    let flag = launch_box_index_check(index, 2);
    assert_eq!(await_box_index_valid(flag).await, Ok(()));
}

#[tokio::test]
async fn test_deferred_check_out_of_range() {
    let index = Arc::new(Tensor::vector(vec![0, 5]));
    let flag = launch_box_index_check(index, 2);
    let err = await_box_index_valid(flag).await.unwrap_err();
    assert!(err.is_out_of_range());
}

#[tokio::test]
async fn test_dropped_flag_is_internal() {
    let (tx, rx) = oneshot::channel::<bool>();
    drop(tx);
    let err = await_box_index_valid(rx).await.unwrap_err();
    assert!(err.is_internal());
}

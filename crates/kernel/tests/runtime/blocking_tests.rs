use super::*;

#[tokio::test]
async fn run_blocking_should_return_value() {
    let result = run_blocking("sum", || Ok::<_, AppError>(1 + 2))
        .await
        .expect("run blocking success");
    assert_eq!(result, 3);
}

#[tokio::test]
async fn run_blocking_should_pass_through_inner_error() {
    let result = run_blocking::<(), _>("inner_error", || {
        Err(AppError::new("transfer_io_failed", "Transfer interrupted"))
    })
    .await;

    assert_eq!(
        result.expect_err("inner error should surface").code,
        "transfer_io_failed"
    );
}

#[tokio::test]
async fn run_blocking_should_map_panic_error() {
    let result = run_blocking::<(), _>("panic_case", || panic!("panic in blocking job")).await;
    let error = result.expect_err("expect panic mapping");
    assert_eq!(error.code, "blocking_task_panicked");
    assert_eq!(error.context_value("blockingTask"), Some("panic_case"));
}

#[tokio::test]
async fn run_blocking_should_allow_blocking_io_in_job() {
    let result = run_blocking("sleep", || {
        std::thread::sleep(std::time::Duration::from_millis(5));
        Ok::<_, AppError>("slept")
    })
    .await
    .expect("blocking sleep");
    assert_eq!(result, "slept");
}

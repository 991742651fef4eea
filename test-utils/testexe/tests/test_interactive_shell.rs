//! InteractiveShell scenarios against the `>`-prompted echo executable.

mod common;

use common::{TestEnv, STEP_TIMEOUT};
use runproc_host::{InteractiveShell, ProcessError, ShellConfig};
use std::time::Duration;

#[tokio::test]
async fn test_intro_and_terminate() {
    let env = TestEnv::new("shell-intro");
    let mut shell = env.interactive_shell().await;

    let intro = shell.read_to_prompt(Some(STEP_TIMEOUT)).await.unwrap();
    assert!(intro.found);
    assert!(intro.text.contains("Interactive testexe ready"), "intro was {:?}", intro.text);

    shell.terminate().await.unwrap();
    assert!(!shell.is_alive().unwrap());
    assert_eq!(shell.exit_code().unwrap(), 0);
}

#[tokio::test]
async fn test_send_and_receive_echoes() {
    let env = TestEnv::new("shell-echo");
    let mut shell = env.interactive_shell().await;
    shell.read_to_prompt(Some(STEP_TIMEOUT)).await.unwrap();

    for input in ["hello", "second line", "x"] {
        let reply = shell.send_and_receive(input, Some(STEP_TIMEOUT)).await.unwrap();
        assert!(reply.found);
        assert!(
            reply.text.contains(&format!("You wrote {}", input)),
            "reply was {:?}",
            reply.text
        );
    }

    shell.terminate().await.unwrap();
}

#[tokio::test]
async fn test_read_without_new_prompt_times_out() {
    let env = TestEnv::new("shell-timeout");
    let mut shell = env.interactive_shell().await;
    shell.read_to_prompt(Some(STEP_TIMEOUT)).await.unwrap();

    // Nothing was sent, so no further prompt is coming
    let reply = shell
        .read_to_prompt(Some(Duration::from_millis(200)))
        .await
        .unwrap();
    assert!(!reply.found);
    assert_eq!(reply.text, "");
    assert!(shell.is_alive().unwrap());

    shell.terminate().await.unwrap();
    assert!(!shell.is_alive().unwrap());
}

#[tokio::test]
async fn test_exit_command_ends_stream() {
    let env = TestEnv::new("shell-bye");
    let mut shell = env.interactive_shell().await;
    shell.read_to_prompt(Some(STEP_TIMEOUT)).await.unwrap();

    let reply = shell.send_and_receive("bye", Some(STEP_TIMEOUT)).await.unwrap();
    assert!(!reply.found);
    assert_eq!(reply.text.trim_end(), "Goodbye");

    shell.terminate().await.unwrap();
    assert_eq!(shell.exit_code().unwrap(), 0);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let env = TestEnv::new("shell-twice");
    let mut shell = env.interactive_shell().await;
    assert!(matches!(
        shell.start(common::interactive_path(), env.work_dir()).await,
        Err(ProcessError::InvalidState { .. })
    ));
    shell.terminate().await.unwrap();
}

#[tokio::test]
async fn test_unstarted_shell_rejects_operations() {
    let mut shell = InteractiveShell::with_config(ShellConfig::new(">", "bye")).unwrap();
    assert!(matches!(
        shell.send_and_receive("hello", None).await,
        Err(ProcessError::OperationNotAllowed { .. })
    ));
    assert!(matches!(
        shell.exit_code(),
        Err(ProcessError::OperationNotAllowed { .. })
    ));
}

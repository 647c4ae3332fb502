//! Integration tests for the heartbeat dispatch pipeline.
//!
//! A fake companion executable records its argument vector to a file, so
//! these tests observe exactly what an editor-driven dispatch would run.

#[cfg(unix)]
mod dispatch_flow {
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};
    use tempo_agent::{CliTool, Dispatcher, EditorEvent, Plugin};

    fn install_recording_cli(cli: &CliTool, record: &Path) {
        use std::os::unix::fs::PermissionsExt;

        let path = cli.cli_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$*\" >> '{}'\nexit 0\n",
            record.display()
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn recorded_lines(record: &Path, expected: usize) -> Vec<String> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let lines: Vec<String> = std::fs::read_to_string(record)
                .map(|contents| contents.lines().map(str::to_string).collect())
                .unwrap_or_default();
            if lines.len() >= expected || Instant::now() > deadline {
                return lines;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn change_event(file: &str) -> EditorEvent {
        EditorEvent {
            file: Some(PathBuf::from(file)),
            is_write: false,
            is_empty: false,
        }
    }

    fn save_event(file: &str) -> EditorEvent {
        EditorEvent {
            file: Some(PathBuf::from(file)),
            is_write: true,
            is_empty: false,
        }
    }

    #[test]
    fn test_dispatched_event_invokes_companion_binary() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("argv.txt");
        let cli = CliTool::with_resources_dir(dir.path().join("resources"));
        install_recording_cli(&cli, &record);
        assert!(cli.is_installed());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut dispatcher =
            Dispatcher::new(cli, Plugin::new("helix", "25.01"), runtime.handle().clone());

        dispatcher.on_event(&save_event("/home/dev/project/main.rs"));

        let lines = recorded_lines(&record, 1);
        assert_eq!(lines.len(), 1);
        let argv = &lines[0];
        assert!(argv.contains("--file /home/dev/project/main.rs"));
        assert!(argv.contains("--plugin helix/25.01 helix-tempo/"));
        assert!(argv.contains("--write"));
    }

    #[test]
    fn test_change_events_inside_window_are_throttled() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("argv.txt");
        let cli = CliTool::with_resources_dir(dir.path().join("resources"));
        install_recording_cli(&cli, &record);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut dispatcher =
            Dispatcher::new(cli, Plugin::new("helix", "25.01"), runtime.handle().clone());

        dispatcher.on_event(&change_event("/home/dev/project/main.rs"));
        dispatcher.on_event(&change_event("/home/dev/project/main.rs"));

        let lines = recorded_lines(&record, 1);
        assert_eq!(lines.len(), 1, "second change within the window must not send");

        // A save for the same file bypasses the window.
        dispatcher.on_event(&save_event("/home/dev/project/main.rs"));
        let lines = recorded_lines(&record, 2);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("--write"));
    }

    #[test]
    fn test_switching_files_bypasses_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("argv.txt");
        let cli = CliTool::with_resources_dir(dir.path().join("resources"));
        install_recording_cli(&cli, &record);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut dispatcher =
            Dispatcher::new(cli, Plugin::new("helix", "25.01"), runtime.handle().clone());

        dispatcher.on_event(&change_event("/home/dev/project/a.rs"));
        dispatcher.on_event(&change_event("/home/dev/project/b.rs"));

        // Both sends are in flight concurrently, so completion order can vary.
        let lines = recorded_lines(&record, 2);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|line| line.contains("a.rs")));
        assert!(lines.iter().any(|line| line.contains("b.rs")));
    }

    #[test]
    fn test_untitled_and_empty_documents_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("argv.txt");
        let cli = CliTool::with_resources_dir(dir.path().join("resources"));
        install_recording_cli(&cli, &record);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut dispatcher =
            Dispatcher::new(cli, Plugin::new("helix", "25.01"), runtime.handle().clone());

        dispatcher.on_event(&EditorEvent {
            file: None,
            is_write: true,
            is_empty: false,
        });
        dispatcher.on_event(&EditorEvent {
            file: Some(PathBuf::from("/home/dev/project/empty.rs")),
            is_write: true,
            is_empty: true,
        });

        // Give any stray invocation time to land, then check none did.
        std::thread::sleep(Duration::from_millis(300));
        assert!(!record.exists());
    }
}

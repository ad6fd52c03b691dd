//! Tests for the locks subsystem.

use super::*;
use crate::error::CorralError;
use crate::test_support::{
    AliveProbe, DeadProbe, fast_lock_config, manager_as, temp_manager, write_aged_lock,
    write_raw_lock,
};
use std::fs;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn other_owner(pid: u32) -> Owner {
    Owner {
        pid,
        host: Owner::current().host,
    }
}

fn remote_owner(pid: u32) -> Owner {
    Owner {
        pid,
        host: "build-farm-17.example.net".to_string(),
    }
}

fn manager_with_probe(dir: &TempDir, probe: impl crate::liveness::LivenessProbe + 'static) -> LockManager {
    LockManager::new(fast_lock_config(dir.path()))
        .unwrap()
        .with_probe(probe)
}

#[test]
fn test_acquire_creates_owned_lock() {
    let (_temp_dir, manager) = temp_manager();

    assert!(manager.try_acquire("migrate"));

    assert!(manager.lock_path("migrate").exists());
    assert!(manager.is_locked("migrate"));
    assert!(manager.owns_lock("migrate"));
    assert_eq!(manager.held_locks(), vec!["migrate".to_string()]);

    let info = manager.lock_info("migrate").unwrap();
    assert_eq!(info.name, "migrate");
    assert_eq!(info.pid, std::process::id());
    assert_eq!(info.host, manager.owner().host);
}

#[test]
fn test_second_manager_waits_for_release() {
    let temp_dir = TempDir::new().unwrap();
    let first = manager_as(temp_dir.path(), 1001);
    let second = manager_as(temp_dir.path(), 1002);

    assert!(first.try_acquire("migrate"));
    assert!(!second.try_acquire("migrate"));
    assert!(second.is_locked("migrate"));
    assert!(!second.owns_lock("migrate"));

    assert!(first.release("migrate"));
    assert!(second.try_acquire("migrate"));
    assert!(second.owns_lock("migrate"));
    assert!(!first.owns_lock("migrate"));
}

#[test]
fn test_blocking_acquire_times_out() {
    let temp_dir = TempDir::new().unwrap();
    let holder = manager_as(temp_dir.path(), 1001);
    let waiter = manager_as(temp_dir.path(), 1002);
    assert!(holder.try_acquire("job"));

    let start = Instant::now();
    assert!(!waiter.acquire("job", Some(Duration::from_millis(60)), true));
    assert!(start.elapsed() >= Duration::from_millis(60));
    assert!(holder.owns_lock("job"));
    assert!(waiter.held_locks().is_empty());
}

#[test]
fn test_non_blocking_acquire_ignores_timeout() {
    let temp_dir = TempDir::new().unwrap();
    let holder = manager_as(temp_dir.path(), 1001);
    let other = manager_as(temp_dir.path(), 1002);
    assert!(holder.try_acquire("job"));

    let start = Instant::now();
    assert!(!other.acquire("job", Some(Duration::from_secs(10)), false));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_blocking_acquire_succeeds_after_release() {
    let temp_dir = TempDir::new().unwrap();
    let holder = manager_as(temp_dir.path(), 1001);
    let waiter = manager_as(temp_dir.path(), 1002);
    assert!(holder.try_acquire("job"));

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(40));
            assert!(holder.release("job"));
        });
        assert!(waiter.acquire("job", Some(Duration::from_secs(5)), true));
    });

    assert!(waiter.owns_lock("job"));
}

#[test]
fn test_lock_older_than_max_age_is_reclaimed_by_acquire() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager_with_probe(&temp_dir, AliveProbe);
    write_aged_lock(&manager, "x", &other_owner(4242), 7200.0);

    assert!(manager.is_stale("x", None));
    assert!(!manager.is_stale("x", Some(Duration::from_secs(10_000))));

    assert!(manager.acquire("x", None, true));
    assert!(manager.owns_lock("x"));
    assert!(manager.lock_info("x").unwrap().age_secs() < 60.0);
}

#[test]
fn test_is_locked_reclaims_stale_lock() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager_with_probe(&temp_dir, AliveProbe);
    write_aged_lock(&manager, "x", &other_owner(4242), 7200.0);

    assert!(!manager.is_locked("x"));
    assert!(!manager.lock_path("x").exists());
}

#[test]
fn test_fresh_lock_is_not_stale() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager_with_probe(&temp_dir, AliveProbe);
    write_aged_lock(&manager, "x", &other_owner(4242), 5.0);

    assert!(!manager.is_stale("x", None));
    assert!(manager.is_locked("x"));
    assert!(!manager.try_acquire("x"));
}

#[test]
fn test_missing_lock_is_not_stale() {
    let (_temp_dir, manager) = temp_manager();
    assert!(!manager.is_stale("nothing", None));
    assert!(!manager.is_locked("nothing"));
}

#[test]
fn test_corrupt_descriptor_reports_no_info() {
    let (_temp_dir, manager) = temp_manager();
    write_raw_lock(&manager, "x", "{not valid json");

    assert!(manager.lock_info("x").is_none());
    assert!(!manager.owns_lock("x"));
    assert_eq!(manager.lock_status("x"), LockStatus::Unknown);
    assert_eq!(manager.lock_status("x").to_string(), "Locked (no info available)");
    assert!(manager.lock_path("x").exists());
    assert!(manager.is_stale("x", None));
}

#[test]
fn test_corrupt_descriptor_is_reclaimed_by_acquire() {
    let (_temp_dir, manager) = temp_manager();
    write_raw_lock(&manager, "x", "");

    assert!(manager.try_acquire("x"));
    assert!(manager.owns_lock("x"));
}

#[test]
fn test_corrupt_descriptor_is_reclaimed_by_is_locked() {
    let (_temp_dir, manager) = temp_manager();
    write_raw_lock(&manager, "x", "garbage");

    assert!(!manager.is_locked("x"));
    assert!(!manager.lock_path("x").exists());
}

#[test]
fn test_release_and_force_release_of_missing_lock_succeed() {
    let (_temp_dir, manager) = temp_manager();
    assert!(manager.release("never-acquired"));
    assert!(manager.force_release("never-acquired"));
}

#[test]
fn test_release_refuses_foreign_lock() {
    let temp_dir = TempDir::new().unwrap();
    let holder = manager_as(temp_dir.path(), 1001);
    let other = manager_as(temp_dir.path(), 1002);
    assert!(holder.try_acquire("job"));

    assert!(!other.release("job"));
    assert!(holder.lock_path("job").exists());

    assert!(other.force_release("job"));
    assert!(!holder.lock_path("job").exists());
}

#[test]
fn test_release_refuses_corrupt_lock() {
    let (_temp_dir, manager) = temp_manager();
    write_raw_lock(&manager, "x", "???");

    assert!(!manager.release("x"));
    assert!(manager.lock_path("x").exists());
}

#[test]
fn test_refresh_by_non_owner_leaves_timestamp() {
    let temp_dir = TempDir::new().unwrap();
    let stranger = manager_as(temp_dir.path(), 1002);
    let original = write_aged_lock(&stranger, "job", &other_owner(1001), 100.0);

    assert!(!stranger.refresh("job"));
    assert_eq!(stranger.lock_info("job").unwrap().time, original.time);

    let owner = manager_as(temp_dir.path(), 1001);
    assert!(owner.refresh("job"));
    let refreshed = owner.lock_info("job").unwrap();
    assert!(refreshed.time > original.time);
    assert_eq!(refreshed.pid, 1001);
}

#[test]
fn test_refresh_of_missing_lock_fails() {
    let (_temp_dir, manager) = temp_manager();
    assert!(!manager.refresh("job"));
    assert!(!manager.lock_path("job").exists());
}

#[test]
fn test_lock_expires_and_is_cleared() {
    let temp_dir = TempDir::new().unwrap();
    let config = fast_lock_config(temp_dir.path()).with_max_age(Duration::from_secs(1));
    let manager = LockManager::new(config).unwrap();

    assert!(manager.acquire("job", None, true));
    assert!(!manager.is_stale("job", None));

    thread::sleep(Duration::from_millis(1100));
    assert!(manager.is_stale("job", None));

    assert!(manager.clear_stale(Some(Duration::ZERO)) >= 1);
    assert!(!manager.is_locked("job"));
}

#[test]
fn test_remote_owner_is_assumed_alive() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager_with_probe(&temp_dir, DeadProbe);
    write_aged_lock(&manager, "job", &remote_owner(4242), 10.0);

    assert!(!manager.is_stale("job", None));
    assert!(!manager.try_acquire("job"));
    assert!(matches!(manager.lock_status("job"), LockStatus::Held(_)));
}

#[test]
fn test_remote_owner_expires_by_age() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager_with_probe(&temp_dir, AliveProbe);
    write_aged_lock(&manager, "job", &remote_owner(4242), 7200.0);

    assert!(manager.is_stale("job", None));
    assert!(manager.try_acquire("job"));
}

#[test]
fn test_dead_local_owner_is_stale() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager_with_probe(&temp_dir, DeadProbe);
    write_aged_lock(&manager, "job", &other_owner(4242), 10.0);

    assert!(manager.is_stale("job", None));
    assert!(manager.try_acquire("job"));
    assert!(manager.owns_lock("job"));
}

#[cfg(unix)]
#[test]
fn test_exited_process_lock_is_reclaimed() {
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();

    let (_temp_dir, manager) = temp_manager();
    write_aged_lock(&manager, "job", &other_owner(pid), 1.0);

    assert!(manager.is_stale("job", None));
    assert!(manager.try_acquire("job"));
}

#[test]
fn test_guard_releases_on_drop() {
    let (_temp_dir, manager) = temp_manager();

    {
        let guard = manager.acquire_guard("deploy", None).unwrap();
        assert_eq!(guard.name(), "deploy");
        assert!(guard.path().exists());
        assert!(guard.refresh());
    }

    assert!(!manager.lock_path("deploy").exists());
    assert!(manager.held_locks().is_empty());
}

#[test]
fn test_guard_manual_release() {
    let (_temp_dir, manager) = temp_manager();

    let guard = manager.try_acquire_guard("deploy").unwrap();
    let path = guard.path();
    guard.release().unwrap();

    assert!(!path.exists());
}

#[test]
fn test_guard_contention_reports_holder() {
    let temp_dir = TempDir::new().unwrap();
    let holder = manager_as(temp_dir.path(), 1001);
    let other = manager_as(temp_dir.path(), 1002);
    let _guard = holder.try_acquire_guard("deploy").unwrap();

    let err = other.try_acquire_guard("deploy").unwrap_err();
    assert!(matches!(err, CorralError::LockError(_)));
    assert!(err.to_string().contains("held by another process"));
    assert!(err.to_string().contains("Locked by PID 1001"));

    let err = other
        .acquire_guard("deploy", Some(Duration::from_millis(20)))
        .unwrap_err();
    assert_eq!(err.exit_code(), crate::exit_codes::LOCK_FAILURE);
}

#[test]
fn test_dropping_manager_releases_held_locks() {
    let temp_dir = TempDir::new().unwrap();
    let observer = manager_as(temp_dir.path(), 2000);

    {
        let manager = manager_as(temp_dir.path(), 1001);
        assert!(manager.try_acquire("a"));
        assert!(manager.try_acquire("b"));
        assert!(observer.is_locked("a"));
    }

    assert!(!observer.is_locked("a"));
    assert!(!observer.is_locked("b"));
}

#[test]
fn test_dropping_manager_keeps_locks_taken_over_by_others() {
    let temp_dir = TempDir::new().unwrap();
    let usurper = manager_as(temp_dir.path(), 1002);

    {
        let manager = manager_as(temp_dir.path(), 1001);
        assert!(manager.try_acquire("c"));
        assert!(usurper.force_release("c"));
        assert!(usurper.try_acquire("c"));
    }

    assert!(usurper.owns_lock("c"));
}

#[test]
fn test_list_locks_sorted_and_filtered() {
    let (temp_dir, manager) = temp_manager();
    assert!(manager.try_acquire("zeta"));
    assert!(manager.try_acquire("alpha"));
    assert!(manager.try_acquire("db:migrate"));
    write_raw_lock(&manager, "broken", "not json");
    fs::write(temp_dir.path().join("notes.txt"), "ignore me").unwrap();
    fs::write(temp_dir.path().join(".alpha.lock.99.0.tmp"), "{}").unwrap();

    let locks = manager.list_locks();
    let names: Vec<&str> = locks.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "broken", "db:migrate", "zeta"]);

    let broken = &locks[1];
    assert!(broken.descriptor.is_none());
    assert!(broken.is_stale);
    assert!(broken.to_string().contains("STALE"));

    let migrate = &locks[2];
    assert!(!migrate.is_stale);
    assert!(migrate.path.ends_with("db_migrate.lock"));
    assert!(migrate.to_string().starts_with("db:migrate (pid: "));
}

#[test]
fn test_unreadable_lock_dir_degrades_to_empty() {
    let temp_dir = TempDir::new().unwrap();
    let lock_dir = temp_dir.path().join("locks");
    let manager = LockManager::new(fast_lock_config(&lock_dir)).unwrap();
    fs::remove_dir_all(&lock_dir).unwrap();

    assert!(manager.list_locks().is_empty());
    assert_eq!(manager.clear_stale(None), 0);
    assert!(!manager.try_acquire("job"));
}

#[test]
fn test_clear_stale_keeps_live_locks() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager_with_probe(&temp_dir, AliveProbe);
    assert!(manager.try_acquire("fresh"));
    write_aged_lock(&manager, "old", &other_owner(4242), 7200.0);

    assert_eq!(manager.clear_stale(None), 1);
    assert!(manager.is_locked("fresh"));
    assert!(!manager.lock_path("old").exists());
}

#[test]
fn test_wait_for_lock() {
    let temp_dir = TempDir::new().unwrap();
    let holder = manager_as(temp_dir.path(), 1001);
    let waiter = manager_as(temp_dir.path(), 1002);

    assert!(waiter.wait("job", Duration::ZERO));

    assert!(holder.try_acquire("job"));
    assert!(!waiter.wait("job", Duration::from_millis(30)));

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(40));
            holder.release("job");
        });
        assert!(waiter.wait("job", Duration::from_secs(5)));
    });
}

#[test]
fn test_unbounded_timeouts_wait_for_release() {
    let temp_dir = TempDir::new().unwrap();
    let holder = manager_as(temp_dir.path(), 1001);
    let waiter = manager_as(temp_dir.path(), 1002);
    assert!(holder.try_acquire("job"));

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(40));
            holder.release("job");
        });
        assert!(waiter.wait("job", Duration::MAX));
    });

    assert!(holder.try_acquire("job"));
    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(40));
            holder.release("job");
        });
        assert!(waiter.acquire("job", Some(Duration::from_secs(u64::MAX)), true));
    });
    assert!(waiter.owns_lock("job"));
}

#[test]
fn test_lock_status_formats() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager_with_probe(&temp_dir, AliveProbe);

    assert_eq!(manager.lock_status("job").to_string(), "Not locked");

    write_aged_lock(&manager, "job", &other_owner(4321), 192.0);
    let status = manager.lock_status("job").to_string();
    assert!(status.starts_with(&format!(
        "Locked by PID 4321 on {} since 3m",
        manager.owner().host
    )));
    assert!(manager.lock_status("job").is_locked());
}

#[test]
fn test_lock_status_reclaims_stale_lock() {
    let temp_dir = TempDir::new().unwrap();
    let manager = manager_with_probe(&temp_dir, AliveProbe);
    write_aged_lock(&manager, "job", &other_owner(4321), 7200.0);

    assert_eq!(manager.lock_status("job"), LockStatus::Unlocked);
    assert!(!manager.lock_path("job").exists());
}

#[test]
fn test_colliding_names_share_a_lock() {
    let temp_dir = TempDir::new().unwrap();
    let first = manager_as(temp_dir.path(), 1001);
    let second = manager_as(temp_dir.path(), 1002);

    assert!(first.try_acquire("db:migrate"));
    assert!(!second.try_acquire("db/migrate"));
    assert_eq!(second.lock_info("db/migrate").unwrap().name, "db:migrate");
}

#[test]
fn test_hostile_names_stay_inside_lock_dir() {
    let (temp_dir, manager) = temp_manager();

    assert!(manager.try_acquire("../../escape"));
    let path = manager.lock_path("../../escape");
    assert_eq!(path.parent().unwrap(), temp_dir.path());
    assert!(path.exists());
}

#[test]
fn test_new_fails_when_lock_dir_cannot_be_created() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("file");
    fs::write(&blocker, "not a directory").unwrap();

    let err = LockManager::new(fast_lock_config(&blocker.join("locks"))).unwrap_err();
    assert!(matches!(err, CorralError::UserError(_)));
    assert!(err.to_string().contains("failed to create lock directory"));
}

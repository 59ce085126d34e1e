// Shared test fixture: a fake site with stub database tools.
//
// The dump stub copies a "database state" file to wherever the engine asks
// (`-f <path>`), and the restore stub copies the supplied dump back over the
// state file. That keeps the full orchestration path honest without a real
// database server.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use backupcenter::config::{AppConfig, DatabaseConfig, SitePaths};

pub struct TestSite {
    // Held for its Drop: removes the whole fixture tree.
    #[allow(dead_code)]
    pub dir: tempfile::TempDir,
    pub cfg: AppConfig,
    pub db_state: PathBuf,
}

pub fn write_stub(path: &Path, body: &str) {
    fs::write(path, body).expect("write stub script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod stub script");
}

/// Stub that extracts the `-f <path>` argument into `$out` and then runs
/// `action` (which may reference `$out`).
fn arg_parsing_stub(action: &str) -> String {
    format!(
        "#!/bin/sh\n\
         out=\"\"\n\
         prev=\"\"\n\
         for a in \"$@\"; do\n\
         \x20 if [ \"$prev\" = \"-f\" ]; then out=\"$a\"; fi\n\
         \x20 prev=\"$a\"\n\
         done\n\
         {action}\n"
    )
}

pub fn test_site() -> TestSite {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();

    let site_root = root.join("site");
    let public_store = site_root.join("public/files");
    let private_store = site_root.join("private/files");
    fs::create_dir_all(&public_store).expect("mkdir public store");
    fs::create_dir_all(&private_store).expect("mkdir private store");
    fs::create_dir_all(site_root.join("private/uploads")).expect("mkdir uploads");
    fs::write(public_store.join("hello.txt"), b"one").expect("seed public store");
    fs::write(private_store.join("secret.txt"), b"s3").expect("seed private store");
    fs::write(
        site_root.join("site_config.json"),
        b"{\"db_name\":\"site\"}",
    )
    .expect("seed site config");

    let db_state = root.join("db_state.sql");
    fs::write(&db_state, b"INSERT INTO t VALUES (1);\n").expect("seed db state");

    let bin = root.join("bin");
    fs::create_dir_all(&bin).expect("mkdir bin");
    let dump_bin = bin.join("dump.sh");
    let restore_bin = bin.join("restore.sh");
    write_stub(
        &dump_bin,
        &arg_parsing_stub(&format!("cp {} \"$out\"", db_state.display())),
    );
    write_stub(
        &restore_bin,
        &arg_parsing_stub(&format!("cp \"$out\" {}", db_state.display())),
    );

    let cfg = AppConfig {
        listen_addr: "127.0.0.1:0".parse().expect("listen addr"),
        admin_token: "test-admin-token".to_string(),
        archive_root: root.join("archive"),
        site: SitePaths {
            root: site_root,
            public_store,
            private_store,
            config_file: root.join("site/site_config.json"),
        },
        database: DatabaseConfig {
            url: "postgres://app@localhost/site".to_string(),
            dump_bin: dump_bin.display().to_string(),
            restore_bin: restore_bin.display().to_string(),
        },
        post_restore_cmd: None,
        subprocess_timeout: Duration::from_secs(10),
    };

    TestSite {
        dir,
        cfg,
        db_state,
    }
}

/// Replaces the dump stub with one that fails like an unreachable server.
#[allow(dead_code)]
pub fn break_dump_tool(site: &TestSite) {
    write_stub(
        Path::new(&site.cfg.database.dump_bin),
        "#!/bin/sh\necho 'pg_dump: error: connection to server failed' >&2\nexit 1\n",
    );
}

/// Makes the restore stub slow enough for lock-contention tests.
#[allow(dead_code)]
pub fn slow_down_restore_tool(site: &TestSite) {
    write_stub(
        Path::new(&site.cfg.database.restore_bin),
        &arg_parsing_stub(&format!(
            "sleep 1\ncp \"$out\" {}",
            site.db_state.display()
        )),
    );
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

const EXIT_SUCCESS: i32 = 0;
const EXIT_CLI: i32 = 2;
const EXIT_FORMAT: i32 = 3;

fn base_command() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cask"));
    cmd.env_remove("CASK_PASSPHRASE");
    cmd
}

fn run_cmd(args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut cmd = base_command();
    cmd.args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.output().expect("run cask")
}

fn temp_dir(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    dir.push(format!("cask-cli-test-{}-{}-{}", label, std::process::id(), nanos));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

fn assert_exit(output: &Output, expected: i32) {
    assert_eq!(
        output.status.code(),
        Some(expected),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn public_key_from_keyfile(path: &Path) -> String {
    let contents = fs::read_to_string(path).expect("read key file");
    contents
        .lines()
        .find_map(|line| line.strip_prefix("# public key: "))
        .expect("public key comment")
        .to_owned()
}

#[test]
fn keygen_encrypt_decrypt_roundtrip() {
    let dir = temp_dir("roundtrip");
    let key_file = dir.join("key.txt");
    let plain = dir.join("plain.txt");
    let sealed = dir.join("plain.txt.age");
    let restored = dir.join("restored.txt");

    assert_exit(
        &run_cmd(&["keygen", "-o", path_str(&key_file)], &[]),
        EXIT_SUCCESS,
    );
    let public_key = public_key_from_keyfile(&key_file);
    assert!(public_key.starts_with("age1"));

    fs::write(&plain, b"cli roundtrip payload\n").expect("write plaintext");
    assert_exit(
        &run_cmd(
            &[
                "encrypt",
                "-r",
                &public_key,
                "-o",
                path_str(&sealed),
                path_str(&plain),
            ],
            &[],
        ),
        EXIT_SUCCESS,
    );

    assert_exit(
        &run_cmd(
            &[
                "decrypt",
                "-i",
                path_str(&key_file),
                "-o",
                path_str(&restored),
                path_str(&sealed),
            ],
            &[],
        ),
        EXIT_SUCCESS,
    );
    assert_eq!(
        fs::read(&restored).expect("read restored"),
        b"cli roundtrip payload\n"
    );

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn armored_output_roundtrips() {
    let dir = temp_dir("armor");
    let key_file = dir.join("key.txt");
    let plain = dir.join("plain.bin");
    let sealed = dir.join("plain.age");
    let restored = dir.join("restored.bin");

    assert_exit(
        &run_cmd(&["keygen", "-o", path_str(&key_file)], &[]),
        EXIT_SUCCESS,
    );
    let public_key = public_key_from_keyfile(&key_file);

    fs::write(&plain, [0u8, 1, 2, 255, 254]).expect("write plaintext");
    assert_exit(
        &run_cmd(
            &[
                "encrypt",
                "--armor",
                "-r",
                &public_key,
                "-o",
                path_str(&sealed),
                path_str(&plain),
            ],
            &[],
        ),
        EXIT_SUCCESS,
    );

    let armored = fs::read_to_string(&sealed).expect("read armored");
    assert!(armored.starts_with("-----BEGIN AGE ENCRYPTED FILE-----\n"));
    assert!(armored.ends_with("-----END AGE ENCRYPTED FILE-----\n"));
    assert!(armored.lines().all(|line| line.len() <= 64));

    assert_exit(
        &run_cmd(
            &[
                "decrypt",
                "-i",
                path_str(&key_file),
                "-o",
                path_str(&restored),
                path_str(&sealed),
            ],
            &[],
        ),
        EXIT_SUCCESS,
    );
    assert_eq!(fs::read(&restored).expect("read restored"), [0u8, 1, 2, 255, 254]);

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn passphrase_roundtrip_via_env() {
    let dir = temp_dir("passphrase");
    let plain = dir.join("plain.txt");
    let sealed = dir.join("plain.age");
    let restored = dir.join("restored.txt");

    fs::write(&plain, b"passphrase payload").expect("write plaintext");
    assert_exit(
        &run_cmd(
            &[
                "encrypt",
                "-p",
                "-o",
                path_str(&sealed),
                path_str(&plain),
            ],
            &[("CASK_PASSPHRASE", "correct horse")],
        ),
        EXIT_SUCCESS,
    );

    assert_exit(
        &run_cmd(
            &[
                "decrypt",
                "-o",
                path_str(&restored),
                path_str(&sealed),
            ],
            &[("CASK_PASSPHRASE", "correct horse")],
        ),
        EXIT_SUCCESS,
    );
    assert_eq!(fs::read(&restored).expect("read restored"), b"passphrase payload");

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn passphrase_file_with_identities_is_refused() {
    let dir = temp_dir("reject-scrypt");
    let key_file = dir.join("key.txt");
    let plain = dir.join("plain.txt");
    let sealed = dir.join("plain.age");

    assert_exit(
        &run_cmd(&["keygen", "-o", path_str(&key_file)], &[]),
        EXIT_SUCCESS,
    );

    fs::write(&plain, b"passphrase only").expect("write plaintext");
    assert_exit(
        &run_cmd(
            &[
                "encrypt",
                "-p",
                "-o",
                path_str(&sealed),
                path_str(&plain),
            ],
            &[("CASK_PASSPHRASE", "pw")],
        ),
        EXIT_SUCCESS,
    );

    // Explicit identities must not fall through to a passphrase prompt.
    let output = run_cmd(
        &["decrypt", "-i", path_str(&key_file), path_str(&sealed)],
        &[("CASK_PASSPHRASE", "pw")],
    );
    assert_exit(&output, EXIT_FORMAT);
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("passphrase-encrypted"),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn encrypt_without_recipients_is_refused() {
    let dir = temp_dir("refusal");
    let plain = dir.join("plain.txt");
    fs::write(&plain, b"data").expect("write plaintext");

    let output = run_cmd(&["encrypt", path_str(&plain)], &[]);
    assert_exit(&output, EXIT_CLI);

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn passphrase_with_recipients_is_refused() {
    let dir = temp_dir("mixed");
    let plain = dir.join("plain.txt");
    fs::write(&plain, b"data").expect("write plaintext");

    let output = run_cmd(
        &[
            "encrypt",
            "-p",
            "-r",
            "age1t7rxyev2z3rw82stdlrrepyc39nvn86l5078zqkf5uasdy86jp6svpy7pa",
            path_str(&plain),
        ],
        &[("CASK_PASSPHRASE", "pw")],
    );
    assert_exit(&output, EXIT_CLI);

    fs::remove_dir_all(&dir).expect("cleanup");
}

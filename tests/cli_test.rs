use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;
use zstdwriter::FrameHeader;

const BIN: &str = env!("CARGO_BIN_EXE_zstdwriter");

fn input_data() -> Vec<u8> {
    (0..1_200_000u32).map(|i| b"zstdwriter cli "[(i % 15) as usize] ^ (i / 4096) as u8).collect()
}

fn run_with_stdin(args: &[&str], stdout: Stdio, data: &[u8]) -> std::process::Output {
    let mut child = Command::new(BIN)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(stdout)
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let data = data.to_vec();
    let feeder = std::thread::spawn(move || {
        stdin.write_all(&data).unwrap();
    });
    let output = child.wait_with_output().unwrap();
    feeder.join().unwrap();
    output
}

#[test]
fn test_seekable_stdout_records_content_size() {
    let data = input_data();
    let out = NamedTempFile::new().unwrap();
    let file = File::create(out.path()).unwrap();

    let output = run_with_stdin(&["-5"], Stdio::from(file), &data);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let mut frame = Vec::new();
    File::open(out.path()).unwrap().read_to_end(&mut frame).unwrap();
    let header = FrameHeader::read(&frame[..]).unwrap();
    assert_eq!(header.content_size as usize, data.len());
    assert!(header.checksum);
    assert_eq!(zstd::decode_all(&frame[..]).unwrap(), data);
}

#[test]
fn test_append_mode_stdout_writes_plain_frame() {
    let data = input_data();
    let out = NamedTempFile::new().unwrap();
    std::fs::write(out.path(), b"earlier output").unwrap();
    let file = OpenOptions::new().append(true).open(out.path()).unwrap();

    let output = run_with_stdin(&["-5"], Stdio::from(file), &data);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let bytes = std::fs::read(out.path()).unwrap();
    assert_eq!(&bytes[..14], b"earlier output");
    let frame = &bytes[14..];
    // Checksum bit only: the size could not have been patched in place.
    assert_eq!(frame[4], 0x04);
    assert_eq!(zstd::decode_all(frame).unwrap(), data);
}

#[test]
fn test_arguments_after_level_are_ignored() {
    let output = run_with_stdin(&["-1", "extra", "-9"], Stdio::piped(), b"abc");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(zstd::decode_all(&output.stdout[..]).unwrap(), b"abc");
}

#[test]
fn test_piped_stdout_writes_plain_frame() {
    let data = input_data();
    let output = run_with_stdin(&["--no-check"], Stdio::piped(), &data);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let frame = output.stdout;
    // No content size on a pipe; descriptor has no checksum bit either.
    assert_eq!(frame[4], 0x00);
    assert_eq!(zstd::decode_all(&frame[..]).unwrap(), data);
}

#[test]
fn test_empty_stdin() {
    let output = run_with_stdin(&[], Stdio::piped(), b"");
    assert!(output.status.success());
    assert!(zstd::decode_all(&output.stdout[..]).unwrap().is_empty());
}

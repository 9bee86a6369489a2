mod common;

use common::{open, open_with, tag_pairings};
use perftags_core::codec::decode_id_list;
use perftags_core::protocol::wire::{
    decode_taggable_tags, encode_pairings, encode_singles, SpecifiedTagsRequest, TagGroupsRequest,
};
use perftags_core::protocol::{STATUS_BAD_COMMAND, STATUS_OK};
use perftags_core::{EngineOptions, Expr, ScratchFiles, Server, TaggableTags};
use std::io::Cursor;
use std::path::Path;

struct Harness {
    server: Server,
    files: ScratchFiles,
}

impl Harness {
    fn new(dir: &Path) -> Self {
        Self::with_server(dir, |files| Server::new(open(dir), files))
    }

    fn with_server(dir: &Path, build: impl FnOnce(ScratchFiles) -> Server) -> Self {
        let files = ScratchFiles {
            write_input: dir.join("write-in.bin"),
            write_output: dir.join("write-out.bin"),
            read_input: dir.join("read-in.bin"),
            read_output: dir.join("read-out.bin"),
        };
        let server = build(files.clone());
        Self { server, files }
    }

    fn write(&mut self, command: &str, payload: &[u8]) -> String {
        std::fs::write(&self.files.write_input, payload).unwrap();
        self.server.handle_line(command)
    }

    fn read(&mut self, command: &str, payload: &[u8]) -> Vec<u8> {
        std::fs::write(&self.files.read_input, payload).unwrap();
        assert_eq!(self.server.handle_line(command), STATUS_OK);
        std::fs::read(&self.files.read_output).unwrap()
    }

    fn seed(&mut self) {
        assert_eq!(self.write("insert_tags", &encode_singles(&[1, 2])), STATUS_OK);
        assert_eq!(
            self.write("insert_taggables", &encode_singles(&[1, 2, 3, 4, 5])),
            STATUS_OK
        );
        let pairings = tag_pairings(&[(1, &[1, 2, 3]), (2, &[2, 3, 4, 5])]);
        assert_eq!(
            self.write("insert_tag_pairings", &encode_pairings(&pairings)),
            STATUS_OK
        );
    }
}

#[test]
fn mutations_and_reads_over_scratch_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(dir.path());
    harness.seed();

    let tags = harness.read("read_taggables_tags", &encode_singles(&[3, 1]));
    assert_eq!(
        decode_taggable_tags(&tags).unwrap(),
        vec![
            TaggableTags {
                taggable: 3,
                tags: vec![1, 2],
            },
            TaggableTags {
                taggable: 1,
                tags: vec![1],
            },
        ]
    );

    let request = SpecifiedTagsRequest {
        tags: vec![2],
        taggables: vec![1, 2],
    };
    let specified = harness.read("read_taggables_specified_tags", &request.encode());
    assert_eq!(
        decode_taggable_tags(&specified).unwrap(),
        vec![
            TaggableTags {
                taggable: 1,
                tags: Vec::new(),
            },
            TaggableTags {
                taggable: 2,
                tags: vec![2],
            },
        ]
    );

    let request = TagGroupsRequest {
        groups: vec![vec![1], vec![1, 2]],
        search: Some(Expr::complement(Expr::tag(1))),
    };
    let counts = harness.read("read_tag_groups_taggable_counts", &request.encode());
    assert_eq!(decode_id_list(&counts).unwrap(), vec![0, 2]);

    let expr = Expr::intersect([Expr::tag(1), Expr::tag(2)]);
    let found = harness.read("search", &expr.encode());
    assert_eq!(decode_id_list(&found).unwrap(), vec![2, 3]);

    let mut union = b"(T".to_vec();
    union.extend_from_slice(&1u64.to_be_bytes());
    union.extend_from_slice(b"|T");
    union.extend_from_slice(&2u64.to_be_bytes());
    union.push(b')');
    let found = harness.read("search", &union);
    assert_eq!(decode_id_list(&found).unwrap(), vec![1, 2, 3, 4, 5]);

    let everything = harness.read("search", &[]);
    assert_eq!(decode_id_list(&everything).unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn unknown_commands_are_bad_commands() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(dir.path());

    assert_eq!(harness.server.handle_line("frobnicate\r\n"), STATUS_BAD_COMMAND);
    assert_eq!(harness.server.handle_line(""), STATUS_BAD_COMMAND);
    assert_eq!(harness.server.handle_line("search now"), STATUS_BAD_COMMAND);
    assert_eq!(
        harness.server.handle_line("override no_such_fault"),
        STATUS_BAD_COMMAND
    );
}

#[test]
fn failures_are_reported_on_one_line() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(dir.path());

    let pairings = tag_pairings(&[(1, &[1])]);
    let status = harness.write("insert_tag_pairings", &encode_pairings(&pairings));
    assert!(status.starts_with("ERROR! "), "{status}");
    assert!(status.ends_with("\r\n"));
    assert_eq!(status.matches('\n').count(), 1);

    let status = harness.write("insert_tags", &[1, 2, 3]);
    assert!(status.starts_with("ERROR! "), "{status}");

    let status = harness
        .server
        .handle_line("override fail_tags_insert_between_pairings_and_singles_writes");
    assert!(status.starts_with("ERROR! "), "{status}");
}

#[test]
fn exit_closes_and_later_commands_fail() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(dir.path());
    harness.seed();

    assert_eq!(harness.server.handle_line("exit"), STATUS_OK);
    assert!(harness.server.is_closed());
    assert!(harness.server.handle_line("flush_files").starts_with("ERROR! "));

    let engine = open(dir.path());
    assert_eq!(engine.generation(), 1);
    assert_eq!(engine.search(&Expr::tag(1)), vec![1, 2, 3]);
}

#[test]
fn run_answers_each_line_and_stops_at_exit() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(dir.path());
    std::fs::write(&harness.files.write_input, encode_singles(&[7])).unwrap();

    let input = Cursor::new(b"insert_tags\r\nbogus\nflush_files\nexit\ninsert_tags\n".to_vec());
    let mut output = Vec::new();
    harness.server.run(input, &mut output).unwrap();

    assert_eq!(
        String::from_utf8(output).unwrap(),
        format!("{STATUS_OK}{STATUS_BAD_COMMAND}{STATUS_OK}{STATUS_OK}")
    );
    assert!(harness.server.is_closed());
}

#[test]
fn eof_drops_the_engine_without_losing_acknowledged_work() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(dir.path());
    harness.seed();

    let input = Cursor::new(b"toggle_tag_pairings\n".to_vec());
    let pairings = tag_pairings(&[(1, &[1, 4])]);
    std::fs::write(&harness.files.write_input, encode_pairings(&pairings)).unwrap();
    let mut output = Vec::new();
    harness.server.run(input, &mut output).unwrap();
    assert_eq!(output, STATUS_OK.as_bytes());
    assert!(harness.server.is_closed());

    let engine = open(dir.path());
    assert_eq!(engine.generation(), 0);
    assert_eq!(engine.search(&Expr::tag(1)), vec![2, 3, 4]);
}

#[test]
fn override_reads_the_fault_name_from_the_write_input() {
    let dir = tempfile::tempdir().unwrap();
    let options = EngineOptions::new(dir.path().join("db")).with_fault_injection(true);
    let mut harness = Harness::with_server(dir.path(), |files| {
        Server::new(open_with(options.clone()), files)
    });
    harness.seed();

    assert_eq!(
        harness.write(
            "override",
            b"fail_tags_insert_between_pairings_and_singles_writes\n"
        ),
        STATUS_OK
    );
    let status = harness.write("insert_tags", &encode_singles(&[3]));
    assert!(status.starts_with("ERROR! "), "{status}");
    harness.server.terminate();

    let engine = open_with(options);
    let tags = engine.read_taggables_tags(&[4]);
    assert_eq!(tags[0].tags, vec![2]);
    assert!(engine.search(&Expr::tag(3)).is_empty());
}

#[test]
fn inline_override_arms_the_fault() {
    let dir = tempfile::tempdir().unwrap();
    let options = EngineOptions::new(dir.path().join("db")).with_fault_injection(true);
    let mut harness = Harness::with_server(dir.path(), |files| {
        Server::new(open_with(options), files)
    });

    assert_eq!(
        harness
            .server
            .handle_line("override fail_tags_insert_between_pairings_and_singles_writes"),
        STATUS_OK
    );
    let status = harness.write("insert_taggables", &encode_singles(&[1]));
    assert!(status.starts_with("ERROR! "), "{status}");
    assert_eq!(
        harness.write("insert_taggables", &encode_singles(&[1])),
        STATUS_OK
    );
}

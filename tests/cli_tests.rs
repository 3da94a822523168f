//! Integration tests for CLI functionality

#[cfg(feature = "cli")]
mod cli_integration_tests {
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    use fsadict::cli::commands::{cmd_compile, cmd_dump, cmd_merge, execute, CompileSummary};
    use fsadict::cli::Cli;
    use fsadict::prelude::*;

    fn run(args: &[&str]) -> anyhow::Result<()> {
        let mut argv = vec!["fsadict"];
        argv.extend_from_slice(args);
        execute(Cli::try_parse_from(argv)?.command)
    }

    #[test]
    fn test_compile_then_dump() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.tsv");
        let output = temp_dir.path().join("dict.fsa");
        let dump = temp_dir.path().join("dump.tsv");
        fs::write(&input, "zeta\tlast\nalpha\tfirst\nno tab here\nmid\tmiddle value\n").unwrap();

        let summary = cmd_compile(&input, &output, ValueStoreKind::String, CompilerParams::default()).unwrap();
        assert_eq!(summary, CompileSummary { added: 3, skipped: 1 });

        cmd_dump(&output, &dump, false).unwrap();
        assert_eq!(
            fs::read_to_string(&dump).unwrap(),
            "alpha\tfirst\nmid\tmiddle value\nzeta\tlast\n"
        );
    }

    #[test]
    fn test_dump_json_escapes_keys() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.tsv");
        let output = temp_dir.path().join("dict.fsa");
        let dump = temp_dir.path().join("dump.tsv");
        fs::write(&input, "say \"hi\"\t1\n").unwrap();

        run(&[
            "compile",
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            "int",
        ])
        .unwrap();
        run(&[
            "dump",
            output.to_str().unwrap(),
            dump.to_str().unwrap(),
            "--json-escape",
        ])
        .unwrap();
        assert_eq!(fs::read_to_string(&dump).unwrap(), "\"say \\\"hi\\\"\"\t1\n");
    }

    #[test]
    fn test_dump_json_escapes_string_values_and_binary_keys() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("dict.fsa");
        let dump = temp_dir.path().join("dump.tsv");

        let mut compiler =
            DictionaryCompiler::new(ValueStoreKind::String, CompilerParams::default()).unwrap();
        compiler.add(b"\x02\xfekey".as_slice(), "plain").unwrap();
        compiler.add("text", "a\tb\nc").unwrap();
        compiler.compile().unwrap();
        compiler.write_to_file(&output).unwrap();

        cmd_dump(&output, &dump, true).unwrap();
        assert_eq!(
            fs::read_to_string(&dump).unwrap(),
            "[2,254,107,101,121]\t\"plain\"\n\"text\"\t\"a\\tb\\nc\"\n"
        );

        cmd_dump(&output, &dump, false).unwrap();
        let raw = fs::read(&dump).unwrap();
        assert!(raw.starts_with(b"\x02\xfekey\tplain\n"));
    }

    #[test]
    fn test_compile_json_with_parameters() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.tsv");
        let output = temp_dir.path().join("dict.fsa");
        fs::write(&input, "doc\t{\"a\": [1, 2]}\n").unwrap();

        run(&[
            "compile",
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            "json",
            "compression=zlib",
            "compression_threshold=0",
            "memory_limit_mb=4",
        ])
        .unwrap();

        let dict = Dictionary::open(&output).unwrap();
        assert_eq!(dict.statistics().value_store.compression, Compression::Zlib);
        assert_eq!(
            dict.get_value("doc").unwrap(),
            Some(Value::Json(serde_json::json!({"a": [1, 2]})))
        );
    }

    #[test]
    fn test_unknown_parameter_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.tsv");
        fs::write(&input, "a\t1\n").unwrap();
        let output = temp_dir.path().join("dict.fsa");

        let err = run(&[
            "compile",
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            "int",
            "bogus=1",
        ])
        .unwrap_err();
        assert!(format!("{:#}", err).contains("bogus"));
        assert!(!output.exists());
    }

    #[test]
    fn test_merge_command() {
        let temp_dir = TempDir::new().unwrap();
        let mut dicts = Vec::new();
        for (name, content) in [("a", "k\t1\nx\t1\n"), ("b", "k\t2\ny\t2\n")] {
            let input = temp_dir.path().join(format!("{}.tsv", name));
            let output = temp_dir.path().join(format!("{}.fsa", name));
            fs::write(&input, content).unwrap();
            cmd_compile(&input, &output, ValueStoreKind::Int, CompilerParams::default()).unwrap();
            dicts.push(output);
        }
        let merged = temp_dir.path().join("merged.fsa");

        run(&[
            "merge",
            "-i",
            dicts[0].to_str().unwrap(),
            "-i",
            dicts[1].to_str().unwrap(),
            "-o",
            merged.to_str().unwrap(),
            "int",
        ])
        .unwrap();

        let dict = Dictionary::open(&merged).unwrap();
        assert_eq!(dict.len(), 3);
        assert_eq!(dict.get_value("k").unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn test_merge_rejects_flavor_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.tsv");
        fs::write(&input, "k\t1\n").unwrap();
        let a = temp_dir.path().join("a.fsa");
        let b = temp_dir.path().join("b.fsa");
        cmd_compile(&input, &a, ValueStoreKind::Int, CompilerParams::default()).unwrap();
        cmd_compile(&input, &b, ValueStoreKind::Int, CompilerParams::default()).unwrap();

        let err = cmd_merge(
            &[a, b],
            &temp_dir.path().join("out.fsa"),
            ValueStoreKind::String,
            CompilerParams::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected string"));
    }

    #[test]
    fn test_stats_on_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.fsa");
        assert!(run(&["stats", missing.to_str().unwrap()]).is_err());
    }

    #[test]
    fn test_merge_needs_two_inputs() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.tsv");
        let a = temp_dir.path().join("a.fsa");
        fs::write(&input, "k\t1\n").unwrap();
        cmd_compile(&input, &a, ValueStoreKind::Int, CompilerParams::default()).unwrap();

        let err = run(&[
            "merge",
            "-i",
            a.to_str().unwrap(),
            "-o",
            temp_dir.path().join("out.fsa").to_str().unwrap(),
            "int",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("at least two"));
    }
}

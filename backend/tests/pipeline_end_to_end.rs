use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use instrumentos::{
    extract_file, load, run, run_pipeline, LoadOutcome, PipelineError, PipelineOptions,
    SchemaMapping, SourceFormat, Stage,
};
use tempfile::tempdir;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 31).unwrap()
}

fn read_canonical(path: &Path) -> instrumentos::RecordSet {
    let format = SourceFormat {
        na_values: vec![String::new()],
        ..SourceFormat::default()
    };
    extract_file(path, &format).unwrap().table
}

#[test]
fn test_single_source_row() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("extracao_2025-10-31.csv");
    fs::write(
        &input,
        "TIPO_INSTRUMENTO;MUNICIPIO;EXERCICIO;SITUACAO\nRAG;SAO LUIS;2024.0;Aprovado\n",
    )
    .unwrap();
    let output = dir.path().join("script").join("dados_final.csv");

    let options = PipelineOptions {
        processing_date: Some(date()),
        ..PipelineOptions::new(vec![input], output.clone()).with_schema(SchemaMapping::single_source())
    };
    let report = run_pipeline(&options).unwrap();
    assert_eq!(report.output_rows, 1);
    assert_eq!(report.input_rows, vec![1]);

    let bytes = fs::read(&output).unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
    let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
    assert_eq!(
        text,
        "INSTRUMENTO;MUNICIPIO;STATUS;ANO;DATA_PROCESSAMENTO\n\
         RAG;SAO LUIS;Aprovado;2024;2025-10-31\n"
    );
}

#[test]
fn test_dual_source_missing_year_column() {
    let dir = tempdir().unwrap();
    let annual = dir.path().join("anual.csv");
    fs::write(
        &annual,
        "UF;TIPO_INSTRUMENTO;MACRORREGIAO;REGIAO;MUNICIPIO;SITUACAO;EXERCICIO\n\
         MA;RAG;NORTE;SAO LUIS;SAO LUIS;Aprovado;2024.0\n\
         MA;PAS;SUL;IMPERATRIZ;IMPERATRIZ;Em análise;2025\n",
    )
    .unwrap();
    let quarterly = dir.path().join("quadrimestral.csv");
    fs::write(
        &quarterly,
        "UF;TIPO_INSTRUMENTO;MACRORREGIAO;REGIAO;MUNICIPIO;SITUACAO;FASE\n\
         MA;RDQA;NORTE;SAO LUIS;SAO LUIS;Não iniciado;1º Quadrimestre\n",
    )
    .unwrap();
    let output = dir.path().join("dados_final.csv");

    let options = PipelineOptions {
        processing_date: Some(date()),
        ..PipelineOptions::new(vec![annual, quarterly], output.clone())
            .with_schema(SchemaMapping::dual_source())
    };
    let report = run_pipeline(&options).unwrap();
    assert_eq!(report.input_rows, vec![2, 1]);
    assert_eq!(report.output_rows, 3);

    let table = read_canonical(&output);
    assert_eq!(
        table.columns(),
        &[
            "ESTADO",
            "INSTRUMENTO",
            "NO_MACROREGIONAL",
            "REGIAO",
            "MUNICIPIO",
            "STATUS",
            "FASE",
            "ANO",
            "DATA_PROCESSAMENTO"
        ]
    );

    // Rows keep input order: first source, then second.
    assert_eq!(table.get(0, "ANO"), Some("2024"));
    assert_eq!(table.get(0, "FASE"), None);
    assert_eq!(table.get(1, "ANO"), Some("2025"));
    assert_eq!(table.get(2, "INSTRUMENTO"), Some("RDQA"));
    assert_eq!(table.get(2, "ANO"), None);
    assert_eq!(table.get(2, "FASE"), Some("1º Quadrimestre"));
}

#[test]
fn test_rerun_is_byte_identical() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("extracao.csv");
    fs::write(
        &input,
        "TIPO_INSTRUMENTO;MACRORREGIAO;MUNICIPIO;SITUACAO;FASE;EXERCICIO\n\
         RAG;NORTE;SAO LUIS;Aprovado;;2024.0\n\
         Plano de Saúde;NORTE;SAO LUIS;Aprovado;2022-2025;\n\
         RDQA;SUL;\"IMPERATRIZ; MA\";Não iniciado;2º Quadrimestre;2024\n",
    )
    .unwrap();
    let output = dir.path().join("dados_final.csv");

    let options = PipelineOptions {
        processing_date: Some(date()),
        ..PipelineOptions::new(vec![input], output.clone()).with_schema(SchemaMapping::single_source())
    };

    run_pipeline(&options).unwrap();
    let first = fs::read(&output).unwrap();
    run_pipeline(&options).unwrap();
    let second = fs::read(&output).unwrap();
    assert_eq!(first, second);

    // Delimiters inside values survive the round trip.
    let table = read_canonical(&output);
    assert_eq!(table.get(2, "MUNICIPIO"), Some("IMPERATRIZ; MA"));
    assert_eq!(table.get(1, "ANO"), None);
}

#[test]
fn test_load_without_table_leaves_destination() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("dados_final.csv");
    fs::write(&output, "previous contents").unwrap();

    assert_eq!(load(None, &output).unwrap(), LoadOutcome::Skipped);
    assert_eq!(fs::read_to_string(&output).unwrap(), "previous contents");
}

#[test]
fn test_failed_run_keeps_previous_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("extracao.csv");
    fs::write(&input, "TIPO_INSTRUMENTO;EXERCICIO\nRAG;2024\nRAG;2024;extra\n").unwrap();
    let output = dir.path().join("dados_final.csv");
    fs::write(&output, "previous contents").unwrap();

    let err = run(&[&input], &output, &SchemaMapping::single_source()).unwrap_err();
    assert!(matches!(err, PipelineError::Extract(_)));
    assert_eq!(err.stage(), Stage::Extracting);
    assert_eq!(fs::read_to_string(&output).unwrap(), "previous contents");
}

#[test]
fn test_unwritable_output_fails_while_loading() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("extracao.csv");
    fs::write(&input, "TIPO_INSTRUMENTO;EXERCICIO\nRAG;2024\n").unwrap();
    let output = dir.path().join("dados_final.csv");
    fs::create_dir(&output).unwrap();

    let err = run(&[&input], &output, &SchemaMapping::single_source()).unwrap_err();
    assert!(matches!(err, PipelineError::Write(_)));
    assert_eq!(err.stage(), Stage::Loading);

    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["dados_final.csv".to_string(), "extracao.csv".to_string()]);
}

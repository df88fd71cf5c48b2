use fenris_lor::options::{AssemblyOptions, ColumnElimination, Execution};

#[test]
fn default_options() {
    let options = AssemblyOptions::default();
    assert_eq!(options.max_incidence_degree, 16);
    assert_eq!(options.execution, Execution::Parallel);
    assert_eq!(options.min_parallel_len, 64);
    assert_eq!(options.column_elimination, ColumnElimination::Scan);
    assert_eq!(AssemblyOptions::serial().execution, Execution::Serial);
}

#[test]
fn options_serde_roundtrip_and_partial_input() {
    let options = AssemblyOptions::default()
        .with_max_incidence_degree(32)
        .with_column_elimination(ColumnElimination::BinarySearch)
        .with_min_parallel_len(0);
    assert_eq!(options.min_parallel_len, 1);

    let json = serde_json::to_string(&options).unwrap();
    let parsed: AssemblyOptions = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, options);

    // Missing fields fall back to their defaults
    let partial: AssemblyOptions = serde_json::from_str(r#"{ "execution": "Serial" }"#).unwrap();
    assert_eq!(partial, AssemblyOptions::serial());
}

use lineage_core::db::open_db_in_memory;
use lineage_core::{
    seed_demo_data, CalculationDraft, CalculationRepository, EvaluationError, ExprError,
    RecalcService, RecalcServiceError, SqliteCalculationRepository, SqliteVariableRepository,
    Store,
};
use rusqlite::Connection;

type SqliteRecalcService<'conn> =
    RecalcService<SqliteVariableRepository<'conn>, SqliteCalculationRepository<'conn>>;

fn seeded() -> Connection {
    let conn = open_db_in_memory().unwrap();
    seed_demo_data(&conn).unwrap();
    conn
}

fn service(conn: &Connection) -> SqliteRecalcService<'_> {
    RecalcService::new(
        SqliteVariableRepository::try_new(conn).unwrap(),
        SqliteCalculationRepository::try_new(conn).unwrap(),
    )
}

fn stored_value(conn: &Connection, id: i64) -> Option<f64> {
    conn.query_row(
        "SELECT calculated_value FROM calculations WHERE id = ?1;",
        [id],
        |row| row.get(0),
    )
    .unwrap()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn seeded_calculations_evaluate_and_persist() {
    let conn = seeded();
    let service = service(&conn);

    for (id, expected) in [(1, 22.5), (2, 2.7), (3, 20.0)] {
        assert_eq!(stored_value(&conn, id), None);
        let result = service.process_calculation_by_id(id).unwrap();
        assert_eq!(result.id, Some(id));
        assert_close(result.calculated_value, expected);
        assert_close(stored_value(&conn, id).unwrap(), expected);
    }
}

#[test]
fn variable_change_recalculates_every_dependent() {
    let conn = seeded();
    let service = service(&conn);

    let variable = service.update_variable_value(1, 3.0).unwrap();
    assert_eq!(variable.name, "base_price");

    let results = service.recalculate_for_variable(1).unwrap();
    let ids: Vec<_> = results.iter().map(|result| result.id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);

    for (result, expected) in results.iter().zip([23.0, 3.24, 25.0]) {
        assert_close(result.calculated_value, expected);
    }
    assert_close(stored_value(&conn, 1).unwrap(), 23.0);
    assert_close(stored_value(&conn, 2).unwrap(), 3.24);
    assert_close(stored_value(&conn, 3).unwrap(), 25.0);
}

#[test]
fn recalculation_only_touches_exact_dependents() {
    let conn = seeded();
    let service = service(&conn);
    let unrelated = service
        .create_calculation("uses_twelve", "{id:12} + 1")
        .unwrap();

    let results = service.recalculate_for_variable(2).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, Some(2));
    assert_eq!(stored_value(&conn, 1), None);

    let report = service.recalculate_for_variable_report(1).unwrap();
    assert!(report
        .updated
        .iter()
        .all(|result| result.id != Some(unrelated.id)));
    assert!(report.failed.is_empty());
}

#[test]
fn missing_variable_keeps_stored_value() {
    let conn = seeded();
    let service = service(&conn);
    service.process_calculation_by_id(1).unwrap();

    service
        .update_expression(1, "{ \"id\": 99, \"name\": \"ghost\" } + 1")
        .unwrap();
    let err = service.process_calculation_by_id(1).unwrap_err();
    assert!(matches!(
        err,
        RecalcServiceError::Expression(ExprError::VariableNotFound(99))
    ));
    assert_close(stored_value(&conn, 1).unwrap(), 22.5);
}

#[test]
fn one_failing_calculation_does_not_abort_the_pass() {
    let conn = seeded();
    let service = service(&conn);
    conn.execute(
        "UPDATE calculations SET expression = '{id:1} / ({id:3} - 5)' WHERE id = 2;",
        [],
    )
    .unwrap();

    let report = service.recalculate_for_variable_report(1).unwrap();
    assert_eq!(report.variable_id, 1);
    assert!(!report.pass_id.is_empty());
    assert_eq!(
        report
            .updated
            .iter()
            .map(|result| result.id)
            .collect::<Vec<_>>(),
        vec![Some(1), Some(3)]
    );
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].calculation_id, 2);
    assert_eq!(report.failed[0].name, "price_with_tax");
    assert_eq!(stored_value(&conn, 2), None);

    assert_eq!(service.recalculate_for_variable(1).unwrap().len(), 2);
}

#[test]
fn division_by_zero_is_an_evaluation_error() {
    let conn = seeded();
    let service = service(&conn);
    let draft = CalculationDraft {
        id: None,
        name: "broken".to_string(),
        expression: "{id:3} / ({id:1} - 2.5)".to_string(),
    };
    assert!(matches!(
        service.process_calculation(&draft),
        Err(RecalcServiceError::Expression(ExprError::Evaluation(
            EvaluationError::DivisionByZero { .. }
        )))
    ));
}

#[test]
fn transient_calculation_writes_only_the_derived_value() {
    let conn = seeded();
    let service = service(&conn);
    let draft = CalculationDraft {
        id: Some(3),
        name: "renamed".to_string(),
        expression: "{id:3} * 2".to_string(),
    };

    let result = service.process_calculation(&draft).unwrap();
    assert_close(result.calculated_value, 10.0);
    assert_eq!(result.name, "renamed");

    let stored = service.get_calculation(3).unwrap();
    assert_eq!(stored.name, "discounted_price");
    assert!(stored.expression.contains("\"discount\""));
    assert_eq!(stored.calculated_value, Some(10.0));
}

#[test]
fn negative_and_scientific_values_do_not_change_parsing() {
    let conn = seeded();
    let service = service(&conn);
    service.update_variable_value(1, -2.0).unwrap();
    service.update_variable_value(3, 1.5e2).unwrap();

    let results = service.recalculate_for_variable(1).unwrap();
    assert_close(results[0].calculated_value, 18.0);
    assert_close(results[2].calculated_value, -170.0);
}

#[test]
fn recalculation_pass_in_store_write_commits_together() {
    let store = Store::open_in_memory().unwrap();
    seed_demo_data(store.connection()).unwrap();

    let results = store
        .write(|conn| -> Result<_, RecalcServiceError> {
            let service = service(conn);
            service.update_variable_value(1, 3.0)?;
            service.recalculate_for_variable(1)
        })
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_close(stored_value(store.connection(), 3).unwrap(), 25.0);
}

#[test]
fn rebuilt_index_matches_stored_expressions() {
    let conn = seeded();
    conn.execute("DELETE FROM calculation_dependencies;", [])
        .unwrap();
    let service = service(&conn);
    assert!(service.recalculate_for_variable(1).unwrap().is_empty());

    let report = service.rebuild_dependency_index().unwrap();
    assert_eq!(report.rebuilt, 3);
    assert!(report.skipped.is_empty());

    let calculations = SqliteCalculationRepository::try_new(&conn).unwrap();
    assert_eq!(calculations.dependencies_of(2).unwrap(), vec![1, 2]);
    assert_eq!(service.recalculate_for_variable(1).unwrap().len(), 3);
}

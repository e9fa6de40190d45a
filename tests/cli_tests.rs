//! Driver tests: stub directories on disk through `run_fix` / `run_rules`.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use stubfix::cli::{run_fix, run_rules, FixOptions};
use stubfix::error::StubfixError;

const QTWIDGETS: &str = "\
import typing

from PyQt6 import QtCore

class QLineEdit(QtCore.QObject):
    # text handling
    def setText(self, a0: str) -> None: ...
    def text(self) -> str: ...
";

const QTCORE: &str = "\
class QObject:
    destroyed = pyqtSignal([], ['QObject'])
    def parent(self) -> 'QObject': ...
";

fn stub_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, text) in files {
        fs::write(dir.path().join(name), text).unwrap();
    }
    dir
}

fn write_config(dir: &Path, text: &str) {
    fs::write(dir.join("stubfix.toml"), text).unwrap();
}

#[test]
fn fixes_in_place_and_reports_hashes() {
    let dir = stub_dir(&[("QtWidgets.pyi", QTWIDGETS), ("QtCore.pyi", QTCORE)]);
    let response = run_fix(&FixOptions {
        dir: dir.path().to_path_buf(),
        ..FixOptions::default()
    })
    .unwrap();

    let fixed = fs::read_to_string(dir.path().join("QtWidgets.pyi")).unwrap();
    assert!(fixed.contains("    # text handling\n    def setText(self, a0: typing.Optional[str]) -> None: ...\n"));
    assert!(fixed.contains("    def text(self) -> str: ...\n"));

    let core = fs::read_to_string(dir.path().join("QtCore.pyi")).unwrap();
    assert!(core.contains("def destroyed(self, a0: 'QObject'): ..."));

    let widgets = response
        .modules
        .iter()
        .find(|m| m.module == "QtWidgets")
        .unwrap();
    assert!(widgets.changed);
    assert_ne!(widgets.before_hash, widgets.after_hash);
    assert_eq!(widgets.rules_applied, 1);

    // builtin sip rules found no sip module
    assert!(response
        .diagnostics
        .iter()
        .any(|d| matches!(d, stubfix::diagnostics::Diagnostic::DanglingRuleWarning { .. })));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["schema_version"], "1");
}

#[test]
fn second_run_changes_nothing() {
    let dir = stub_dir(&[("QtWidgets.pyi", QTWIDGETS), ("QtCore.pyi", QTCORE)]);
    let options = FixOptions {
        dir: dir.path().to_path_buf(),
        ..FixOptions::default()
    };
    run_fix(&options).unwrap();
    let first = fs::read_to_string(dir.path().join("QtWidgets.pyi")).unwrap();
    let response = run_fix(&options).unwrap();
    assert_eq!(response.changed_count(), 0);
    assert_eq!(
        fs::read_to_string(dir.path().join("QtWidgets.pyi")).unwrap(),
        first
    );
}

#[test]
fn dry_run_writes_nothing() {
    let dir = stub_dir(&[("QtWidgets.pyi", QTWIDGETS)]);
    let response = run_fix(&FixOptions {
        dir: dir.path().to_path_buf(),
        dry_run: true,
        ..FixOptions::default()
    })
    .unwrap();
    assert!(response.dry_run);
    assert_eq!(response.changed_count(), 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("QtWidgets.pyi")).unwrap(),
        QTWIDGETS
    );
}

#[test]
fn out_dir_receives_every_module() {
    let dir = stub_dir(&[("QtWidgets.pyi", QTWIDGETS), ("QtGui.pyi", "class QColor: ...\n")]);
    let out = TempDir::new().unwrap();
    let target = out.path().join("PyQt6");
    run_fix(&FixOptions {
        dir: dir.path().to_path_buf(),
        out: Some(target.clone()),
        ..FixOptions::default()
    })
    .unwrap();
    assert_eq!(
        fs::read_to_string(target.join("QtGui.pyi")).unwrap(),
        "class QColor: ...\n"
    );
    assert!(fs::read_to_string(target.join("QtWidgets.pyi"))
        .unwrap()
        .contains("typing.Optional[str]"));
    assert_eq!(
        fs::read_to_string(dir.path().join("QtWidgets.pyi")).unwrap(),
        QTWIDGETS
    );
}

#[test]
fn strict_mode_fails_on_diagnostics() {
    let dir = stub_dir(&[("QtWidgets.pyi", QTWIDGETS)]);
    let failure = run_fix(&FixOptions {
        dir: dir.path().to_path_buf(),
        strict: true,
        ..FixOptions::default()
    })
    .unwrap_err();
    assert!(matches!(
        failure.error,
        StubfixError::DiagnosticsReported { .. }
    ));
    assert!(!failure.diagnostics.is_empty());
    assert_eq!(failure.to_response().error.code, 5);
}

#[test]
fn config_and_extra_rules() {
    let dir = stub_dir(&[("QtCore.pyi", QTCORE)]);
    write_config(dir.path(), "[stubfix]\nbuiltin_rules = false\nstrict = true\n");
    let rules = dir.path().join("extra.toml");
    fs::write(
        &rules,
        "[[rule]]\nmodule = \"QtCore\"\nclass = \"QObject\"\nmember = \"parent\"\n[rule.operation]\nkind = \"add_annotation_suppression\"\ncode = \"override\"\n",
    )
    .unwrap();

    let response = run_fix(&FixOptions {
        dir: dir.path().to_path_buf(),
        rules: vec![rules],
        ..FixOptions::default()
    })
    .unwrap();
    assert!(response.diagnostics.is_empty());
    let text = fs::read_to_string(dir.path().join("QtCore.pyi")).unwrap();
    assert!(text.contains("def parent(self) -> 'QObject': ...  # type: ignore[override]"));
}

#[test]
fn parse_errors_leave_file_untouched() {
    let broken = "class A:\n    def f(self\n";
    let dir = stub_dir(&[("QtCore.pyi", broken)]);
    write_config(dir.path(), "[stubfix]\nbuiltin_rules = false\n");
    let response = run_fix(&FixOptions {
        dir: dir.path().to_path_buf(),
        ..FixOptions::default()
    })
    .unwrap();
    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("QtCore.pyi")).unwrap(),
        broken
    );
}

#[test]
fn missing_directory_is_resolution_error() {
    let dir = TempDir::new().unwrap();
    let failure = run_fix(&FixOptions {
        dir: dir.path().join("missing"),
        ..FixOptions::default()
    })
    .unwrap_err();
    assert_eq!(failure.to_response().error.code, 3);
}

#[test]
fn rules_lists_builtin_table_in_precedence_order() {
    let dir = TempDir::new().unwrap();
    let response = run_rules(&[], None, dir.path()).unwrap();
    assert_eq!(response.rules.len(), 5);
    // member rules first, then the priority 10 module rule, the import rule last
    assert_eq!(response.rules[0].operation["kind"], "replace_signature");
    assert_eq!(response.rules[3].operation["kind"], "insert_member");
    assert_eq!(response.rules[3].operation["replace"], true);
    assert_eq!(response.rules[4].priority, 0);
}

#[test]
fn pyqtslot_becomes_overload_set_in_place() {
    let qtcore = "\
import typing

class QObject: ...

def pyqtSlot(*types, name: typing.Optional[str] = ..., result: typing.Optional[str] = ...) -> typing.Callable[..., typing.Any]: ...

def qVersion() -> str: ...
";
    let dir = stub_dir(&[("QtCore.pyi", qtcore)]);
    let options = FixOptions {
        dir: dir.path().to_path_buf(),
        ..FixOptions::default()
    };
    let response = run_fix(&options).unwrap();
    assert!(response
        .diagnostics
        .iter()
        .all(|d| d.module() != Some("QtCore")));

    let fixed = fs::read_to_string(dir.path().join("QtCore.pyi")).unwrap();
    assert!(fixed.starts_with(
        "import typing\n\nclass QObject: ...\n\nT = typing.TypeVar('T')\nFuncT = typing.Callable[..., T]\n@typing.overload\ndef pyqtSlot(*types: typing.Any) -> typing.Callable[[FuncT[T]], FuncT[T]]: ...\n"
    ));
    assert_eq!(fixed.matches("@typing.overload\ndef pyqtSlot(").count(), 12);
    assert!(!fixed.contains("typing.Optional[str] = ..."));
    assert!(fixed.ends_with(
        "def pyqtSlot(*types: typing.Any, name: str, result: str, revision: int) -> typing.Callable[[FuncT[T]], FuncT[T]]: ...\n\ndef qVersion() -> str: ...\n"
    ));

    let again = run_fix(&options).unwrap();
    assert_eq!(again.changed_count(), 0);
}

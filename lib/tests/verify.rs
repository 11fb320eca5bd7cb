//! End to end tests: assemble some classes, then verify all of their methods

use jverify::jvm::assembly::parse_assembly;
use jverify::jvm::class_graph::{ClassGraph, ClassGraphArenas};
use jverify::jvm::verifier::{
    verify_method, Rejection, Settings, Verdict, VerificationStatus,
};
use jverify::jvm::{BinaryName, Name};

/// Verify every method in the source, returning verdicts keyed by method name
fn verify_all(source: &str, settings: &Settings) -> Vec<(String, Verdict)> {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    class_graph.insert_java_library_types();

    let methods = parse_assembly(source, &class_graph)
        .unwrap_or_else(|err| panic!("assembly should parse: {}", err));
    methods
        .iter()
        .map(|method| {
            let verdict = verify_method(&class_graph, method, settings)
                .unwrap_or_else(|err| panic!("verifier bug in {}: {}", method.qualified_name(), err));
            (method.id.name.as_str().to_owned(), verdict)
        })
        .collect()
}

fn verdict_with(source: &str, method: &str, settings: &Settings) -> Verdict {
    verify_all(source, settings)
        .into_iter()
        .find(|(name, _)| name == method)
        .map(|(_, verdict)| verdict)
        .unwrap_or_else(|| panic!("no method named {}", method))
}

fn verdict(source: &str, method: &str) -> Verdict {
    verdict_with(source, method, &Settings::new())
}

fn rejection(verdict: &Verdict) -> String {
    match verdict.violation_message() {
        Some(message) => message.to_owned(),
        None => panic!("expected a verification failure, got: {}", verdict.status),
    }
}

fn assert_ok(verdict: &Verdict) {
    assert!(verdict.is_ok(), "expected success, got: {}", verdict.status);
}

#[test]
fn constant_return() {
    let verdict = verdict(
        r#"
        .class me/alec/Scenarios
        .method m ()I
            .limit stack 1
            iconst_1
            ireturn
        .end method
        "#,
        "m",
    );
    assert_ok(&verdict);
    assert!(verdict.warnings.is_empty());
}

#[test]
fn store_past_the_last_local() {
    let verdict = verdict(
        r#"
        .class me/alec/Scenarios
        .method static m ()V
            .limit stack 1
            .limit locals 1
            iconst_0
            istore 1
            return
        .end method
        "#,
        "m",
    );
    assert_eq!(
        rejection(&verdict),
        "The 'index' is not a valid index into the local variable array."
    );
}

#[test]
fn return_opcode_must_match_return_type() {
    let verdict = verdict(
        r#"
        .class me/alec/Scenarios
        .method static m ()D
            .limit stack 1
            iconst_1
            ireturn
        .end method
        "#,
        "m",
    );
    assert!(
        rejection(&verdict).starts_with("Current method has return type of 'D'"),
        "{}",
        rejection(&verdict)
    );
}

#[test]
fn constructors_must_call_a_constructor() {
    let source = r#"
        .class me/alec/Lazy
        .method public <init> ()V
            return
        .end method

        .class me/alec/Eager
        .method public <init> ()V
            .limit stack 1
            aload_0
            invokespecial java/lang/Object.<init>()V
            return
        .end method
        "#;
    let verdicts = verify_all(source, &Settings::new());
    assert_eq!(
        rejection(&verdicts[0].1),
        "Leaving a constructor that itself did not call a constructor."
    );
    assert_ok(&verdicts[1].1);
}

#[test]
fn load_of_unassigned_local() {
    let verdict = verdict(
        r#"
        .class me/alec/Scenarios
        .method static m ()Ljava/lang/Object;
            .limit stack 1
            .limit locals 1
            aload 0
            areturn
        .end method
        "#,
        "m",
    );
    assert_eq!(
        rejection(&verdict),
        "Read-Access on local variable 0 with unknown content."
    );
}

#[test]
fn finally_subroutine() {
    // Local 1 is untouched by the subroutine, so it is still an `int` after the `ret`
    let verdict = verdict(
        r#"
        .class me/alec/Subroutines
        .method static m (I)I
            .limit stack 1
            .limit locals 3
            iload_0
            istore_1
            jsr Finally
            iload_1
            ireturn
        Finally:
            astore_2
            iinc 0 1
            ret 2
        .end method
        "#,
        "m",
    );
    assert_ok(&verdict);
}

#[test]
fn subroutine_called_from_two_places() {
    // Each call is analysed separately: local 1 is an `int` at one call and a `float` at the other
    let verdict = verdict(
        r#"
        .class me/alec/Subroutines
        .method static m ()F
            .limit stack 1
            .limit locals 3
            iconst_0
            istore_1
            jsr Sub
            iload_1
            pop
            fconst_1
            fstore_1
            jsr Sub
            fload_1
            freturn
        Sub:
            astore_2
            ret 2
        .end method
        "#,
        "m",
    );
    assert_ok(&verdict);
}

#[test]
fn subroutine_with_two_rets() {
    let verdict = verdict(
        r#"
        .class me/alec/Subroutines
        .method static m (I)V
            .limit stack 1
            .limit locals 2
            jsr Sub
            return
        Sub:
            astore_1
            iload_0
            ifeq Other
            ret 1
        Other:
            ret 1
        .end method
        "#,
        "m",
    );
    assert!(rejection(&verdict).starts_with("Subroutine with more than one RET detected"));
}

#[test]
fn recursive_subroutines() {
    let direct = verdict(
        r#"
        .class me/alec/Subroutines
        .method static m ()V
            .limit stack 1
            .limit locals 1
            jsr Sub
            return
        Sub:
            astore_0
            jsr Sub
            ret 0
        .end method
        "#,
        "m",
    );
    assert!(rejection(&direct).contains("recursive call"), "{}", rejection(&direct));

    // A calls B which calls back into A
    let indirect = verdict(
        r#"
        .class me/alec/Subroutines
        .method static m ()V
            .limit stack 1
            .limit locals 3
            jsr A
            return
        A:
            astore_1
            jsr B
            ret 1
        B:
            astore_2
            jsr A
            ret 2
        .end method
        "#,
        "m",
    );
    assert!(rejection(&indirect).contains("recursive call"), "{}", rejection(&indirect));

    // A calls B, B calls C, and C calls back into A
    let three_levels = verdict(
        r#"
        .class me/alec/Subroutines
        .method static m ()V
            .limit stack 1
            .limit locals 4
            jsr A
            return
        A:
            astore_1
            jsr B
            ret 1
        B:
            astore_2
            jsr C
            ret 2
        C:
            astore_3
            jsr A
            ret 3
        .end method
        "#,
        "m",
    );
    assert!(
        rejection(&three_levels).contains("recursive call"),
        "{}",
        rejection(&three_levels)
    );
}

#[test]
fn ret_outside_of_a_subroutine() {
    let verdict = verdict(
        r#"
        .class me/alec/Subroutines
        .method static m ()V
            .limit stack 1
            .limit locals 1
            jsr Sub
            ret 0
        Sub:
            astore_0
            ret 0
        .end method
        "#,
        "m",
    );
    assert!(
        rejection(&verdict).starts_with("RET in top-level code"),
        "{}",
        rejection(&verdict)
    );
}

#[test]
fn handlers_need_stack_space() {
    let verdict = verdict(
        r#"
        .class me/alec/Handlers
        .method static m ()V
            .limit stack 0
        Start:
            nop
        End:
            return
            .catch all from Start to End using End
        .end method
        "#,
        "m",
    );
    assert!(rejection(&verdict).contains("max_stack is 0"), "{}", rejection(&verdict));
}

#[test]
fn unreachable_load_before_a_return() {
    // The `aload 9` is never executed, so its out of range index is never checked
    let verdict = verdict(
        r#"
        .class me/alec/Heuristic
        .method static m ()Ljava/lang/Object;
            .limit stack 1
            .limit locals 0
            aconst_null
            goto Ret
            aload 9
        Ret:
            areturn
        .end method
        "#,
        "m",
    );
    assert_ok(&verdict);
}

#[test]
fn jsr_must_target_an_astore() {
    let verdict = verdict(
        r#"
        .class me/alec/Subroutines
        .method static m ()V
            .limit stack 1
            .limit locals 1
            jsr Sub
            return
        Sub:
            pop
            return
        .end method
        "#,
        "m",
    );
    assert!(rejection(&verdict).contains("must be an astore"), "{}", rejection(&verdict));
}

#[test]
fn exception_handlers() {
    let source = r#"
        .class me/alec/Handlers
        .method static hash (Ljava/lang/String;)I
            .limit stack 1
        Start:
            aload_0
            invokevirtual java/lang/Object.hashCode()I
        End:
            ireturn
        Handler:
            astore_0
            iconst_m1
            ireturn
            .catch java/lang/NullPointerException from Start to End using Handler
        .end method

        .method static rethrow ()V
            .limit stack 1
            .limit locals 1
        Start:
            aconst_null
            athrow
        Handler:
            athrow
            .catch all from Start to Handler using Handler
        .end method

        .method static notThrowable ()V
            .limit stack 1
        Start:
            return
        Handler:
            athrow
            .catch java/lang/String from Start to Handler using Handler
        .end method
        "#;
    let verdicts = verify_all(source, &Settings::new());
    assert_ok(&verdicts[0].1);
    assert_ok(&verdicts[1].1);
    assert!(
        rejection(&verdicts[2].1).contains("java/lang/String"),
        "{}",
        rejection(&verdicts[2].1)
    );
}

#[test]
fn merging_frames() {
    let source = r#"
        .class me/alec/Merges
        .method static pick (ZLjava/lang/String;Ljava/lang/Integer;)Ljava/lang/Object;
            .limit stack 1
            iload_0
            ifeq Second
            aload_1
            goto Done
        Second:
            aload_2
        Done:
            areturn
        .end method

        .method static mixed (Z)V
            .limit stack 1
            iload_0
            ifeq Float
            iconst_0
            goto Join
        Float:
            fconst_0
        Join:
            pop
            return
        .end method

        .method static uneven (Z)V
            .limit stack 2
            iload_0
            ifeq Join
            iconst_0
        Join:
            return
        .end method

        .method static spin ()V
            .limit stack 1
            .limit locals 1
        Top:
            new java/lang/Object
            astore_0
            goto Top
        .end method
        "#;
    let verdicts = verify_all(source, &Settings::new());
    assert_ok(&verdicts[0].1);
    assert!(rejection(&verdicts[1].1).starts_with("Cannot merge stacks of different types"));
    assert!(rejection(&verdicts[2].1).starts_with("Cannot merge stacks of different size"));
    assert!(rejection(&verdicts[3].1).starts_with("Backwards branch with an uninitialized object"));
}

#[test]
fn classes_pending_or_rejected() {
    let source = r#"
        .class me/alec/Later
        .status pending

        .class me/alec/Broken
        .status rejected

        .class me/alec/User
        .method static later ()V
            .limit stack 1
            new me/alec/Later
            pop
            return
        .end method

        .method static broken ()V
            .limit stack 1
            new me/alec/Broken
            pop
            return
        .end method
        "#;
    let verdicts = verify_all(source, &Settings::new());
    assert_eq!(
        verdicts[0].1.status,
        VerificationStatus::NotYet(BinaryName::from_string("me/alec/Later".to_owned()).unwrap())
    );
    assert!(matches!(
        verdicts[1].1.status,
        VerificationStatus::Rejected(Rejection::Resolution(_))
    ));
}

#[test]
fn returned_type_heuristic_can_be_disabled() {
    let source = r#"
        .class me/alec/Heuristic
        .method static cast (Ljava/lang/Integer;)Ljava/lang/String;
            .limit stack 1
            aload_0
            areturn
        .end method
        "#;
    assert_eq!(
        rejection(&verdict(source, "cast")),
        "Returned type Ljava/lang/Integer; does not match Method's return type Ljava/lang/String;"
    );

    let lenient = Settings {
        check_returned_type: false,
        ..Settings::new()
    };
    assert_ok(&verdict_with(source, "cast", &lenient));
}

#[test]
fn uninitialized_objects_left_behind() {
    let source = r#"
        .class me/alec/Leaks
        .method static leak ()V
            .limit stack 1
            .limit locals 1
            new java/lang/Object
            astore_0
            return
        .end method
        "#;
    let verdict = verdict(source, "leak");
    assert_ok(&verdict);
    assert_eq!(verdict.warnings.len(), 1);
    assert!(verdict.warnings[0].contains("uninitialized object in the local variables"));

    let quiet = Settings {
        warn_uninitialized_on_return: false,
        ..Settings::new()
    };
    assert!(verdict_with(source, "leak", &quiet).warnings.is_empty());
}

use jverify::jvm;
use jverify::jvm::verifier::{AssertionViolated, Verdict, VerificationStatus};
use std::io::{self, Write};
use termcolor::{Color, ColorSpec, WriteColor};

/// What happened to one method (or one whole file, if it couldn't be read)
pub enum Outcome {
    /// The method is well-typed, possibly with some warnings
    Ok(Vec<String>),

    /// The method is not well-typed
    Rejected(String),

    /// The method depends on classes that haven't been verified yet
    NotYet(String),

    /// Something went wrong before the verifier could reach a verdict
    Error(String),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Rejected(_) | Outcome::Error(_))
    }

    /// Print a one line summary, followed by the indented message or warnings
    pub fn write_line<W: WriteColor>(&self, out: &mut W, subject: &str) -> io::Result<()> {
        let (color, summary, message) = match self {
            Outcome::Ok(_) => (Color::Green, "OK", None),
            Outcome::Rejected(msg) => (Color::Red, "REJECTED", Some(msg)),
            Outcome::NotYet(msg) => (Color::Yellow, "NOT_YET", Some(msg)),
            Outcome::Error(msg) => (Color::Magenta, "ERROR", Some(msg)),
        };

        out.write_all(b" - ")?;
        out.set_color(ColorSpec::new().set_bold(true))?;
        write!(out, "{}", subject)?;
        out.set_color(ColorSpec::new().set_dimmed(true))?;
        out.write_all(b" [")?;
        out.set_color(ColorSpec::new().set_fg(Some(color)))?;
        out.write_all(summary.as_bytes())?;
        out.set_color(ColorSpec::new().set_dimmed(true))?;
        out.write_all(b"]\n")?;
        out.reset()?;
        if let Some(message) = message {
            writeln!(out, "     {}", message.replace('\n', "\n     "))?;
        }
        if let Outcome::Ok(warnings) = self {
            for warning in warnings {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
                out.write_all(b"     warning: ")?;
                out.reset()?;
                writeln!(out, "{}", warning.replace('\n', "\n     "))?;
            }
        }
        Ok(())
    }
}

impl From<Verdict> for Outcome {
    fn from(verdict: Verdict) -> Outcome {
        match verdict.status {
            VerificationStatus::Ok => Outcome::Ok(verdict.warnings),
            VerificationStatus::Rejected(_) => Outcome::Rejected(verdict.status.to_string()),
            VerificationStatus::NotYet(_) => Outcome::NotYet(verdict.status.to_string()),
        }
    }
}

impl From<AssertionViolated> for Outcome {
    fn from(err: AssertionViolated) -> Outcome {
        Outcome::Error(format!("Verifier bug - {}", err))
    }
}

impl From<jvm::Error> for Outcome {
    fn from(err: jvm::Error) -> Outcome {
        Outcome::Error(format!("Assembly - {}", err))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use termcolor::NoColor;

    fn render(outcome: &Outcome) -> String {
        let mut out = NoColor::new(vec![]);
        outcome.write_line(&mut out, "Foo.jasm:Foo.bar()V").unwrap();
        String::from_utf8(out.into_inner()).unwrap()
    }

    #[test]
    fn warnings_are_listed_under_ok() {
        let outcome = Outcome::Ok(vec![
            String::from("first warning"),
            String::from("second\nwarning"),
        ]);
        assert_eq!(
            render(&outcome),
            " - Foo.jasm:Foo.bar()V [OK]\n     warning: first warning\n     warning: second\n     warning\n"
        );
        assert_eq!(render(&Outcome::Ok(vec![])), " - Foo.jasm:Foo.bar()V [OK]\n");
    }

    #[test]
    fn messages_are_indented() {
        let outcome = Outcome::Rejected(String::from("Constraint violated\nin method"));
        assert_eq!(
            render(&outcome),
            " - Foo.jasm:Foo.bar()V [REJECTED]\n     Constraint violated\n     in method\n"
        );
        assert!(outcome.is_failure());
    }
}

//! Parser for notification templates in the `"{title} at {date:%d %B}"` style.

use super::FormatError;

/// A piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text copied verbatim, with `{{` and `}}` already unescaped.
    Literal(String),
    /// A substitution field with an optional format spec after the colon.
    Field {
        name: &'a str,
        spec: Option<&'a str>,
    },
}

/// Splits a template into literal text and fields.
///
/// `{{` and `}}` stand for literal braces. A field is `{name}` or `{name:spec}`; a `!conversion`
/// suffix on the name is accepted and ignored.
pub fn parse(template: &str) -> Result<Vec<Segment<'_>>, FormatError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '{' => {
                let end = loop {
                    match chars.next() {
                        Some((end, '}')) => break end,
                        Some((_, '{')) => return Err(FormatError::NestedField { position }),
                        Some(_) => {}
                        None => return Err(FormatError::UnclosedField { position }),
                    }
                };

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(field(&template[position + 1..end], position)?);
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(FormatError::UnmatchedClosingBrace { position }),
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(segments)
}

fn field(content: &str, position: usize) -> Result<Segment<'_>, FormatError> {
    let (name, spec) = match content.split_once(':') {
        Some((name, spec)) => (name, Some(spec)),
        None => (content, None),
    };
    let name = name.split('!').next().unwrap_or_default();

    if name.is_empty() {
        return Err(FormatError::EmptyField { position });
    }

    Ok(Segment::Field { name, spec })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(text: &str) -> Segment<'_> {
        Segment::Literal(text.into())
    }

    #[test]
    fn fields_and_literals() {
        assert_eq!(
            parse("{title} at {date:%d %B}!").unwrap(),
            vec![
                Segment::Field {
                    name: "title",
                    spec: None
                },
                lit(" at "),
                Segment::Field {
                    name: "date",
                    spec: Some("%d %B")
                },
                lit("!"),
            ]
        );
    }

    #[test]
    fn escaped_braces() {
        assert_eq!(
            parse("{{literal}} {title!s}").unwrap(),
            vec![
                lit("{literal} "),
                Segment::Field {
                    name: "title",
                    spec: None
                },
            ]
        );
    }

    #[test]
    fn structural_errors() {
        assert_eq!(
            parse("ok {title"),
            Err(FormatError::UnclosedField { position: 3 })
        );
        assert_eq!(
            parse("title}"),
            Err(FormatError::UnmatchedClosingBrace { position: 5 })
        );
        assert_eq!(
            parse("{ti{tle}"),
            Err(FormatError::NestedField { position: 0 })
        );
        assert_eq!(parse("a {}"), Err(FormatError::EmptyField { position: 2 }));
        assert_eq!(
            parse("{:%d}"),
            Err(FormatError::EmptyField { position: 0 })
        );
    }

    #[test]
    fn empty_template() {
        assert_eq!(parse("").unwrap(), vec![]);
    }
}

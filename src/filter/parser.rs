//! Textual rule syntax used by the shell.
//!
//! ```text
//! GPA >= 3.5
//! "Test Score" < 60
//! Status contains active, pending
//! Name contains-case Smith
//! Applied between 2024-01-01 and 2024-06-30
//! Applied from 2024-01-01
//! Applied until 06/30/2024
//! ```

use crate::data::type_inference::TypeInference;
use crate::filter::error::{FilterError, FilterResult};
use crate::filter::rule::{FilterRule, NumericOperator};
use chrono::NaiveDate;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_till1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map, map_res, rest},
    number::complete::double,
    sequence::{delimited, preceded, tuple},
    IResult,
};

enum RawRule<'a> {
    Numeric(String, NumericOperator, f64),
    Text(String, bool, &'a str),
    Between(String, &'a str, &'a str),
    From(String, &'a str),
    Until(String, &'a str),
}

fn column(input: &str) -> IResult<&str, String> {
    alt((
        map(delimited(char('"'), is_not("\""), char('"')), |s: &str| {
            s.trim().to_string()
        }),
        map(
            take_till1(|c: char| c.is_whitespace() || "<>=!".contains(c)),
            |s: &str| s.to_string(),
        ),
    ))(input)
}

fn operator(input: &str) -> IResult<&str, NumericOperator> {
    map_res(
        alt((
            tag(">="),
            tag("<="),
            tag("=="),
            tag("!="),
            tag(">"),
            tag("<"),
            tag("="),
        )),
        |symbol: &str| NumericOperator::from_symbol(if symbol == "=" { "==" } else { symbol }),
    )(input)
}

fn word(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace())(input)
}

fn numeric_rule(input: &str) -> IResult<&str, RawRule<'_>> {
    map(
        tuple((column, multispace0, operator, multispace0, double)),
        |(col, _, op, _, value)| RawRule::Numeric(col, op, value),
    )(input)
}

fn text_rule(input: &str) -> IResult<&str, RawRule<'_>> {
    map(
        tuple((
            column,
            multispace1,
            alt((tag_no_case("contains-case"), tag_no_case("contains"))),
            multispace1,
            rest,
        )),
        |(col, _, keyword, _, tokens): (String, &str, &str, &str, &str)| {
            RawRule::Text(col, keyword.len() > "contains".len(), tokens)
        },
    )(input)
}

fn between_rule(input: &str) -> IResult<&str, RawRule<'_>> {
    map(
        tuple((
            column,
            preceded(multispace1, tag_no_case("between")),
            preceded(multispace1, word),
            preceded(multispace1, tag_no_case("and")),
            preceded(multispace1, word),
        )),
        |(col, _, start, _, end)| RawRule::Between(col, start, end),
    )(input)
}

fn bound_rule(input: &str) -> IResult<&str, RawRule<'_>> {
    alt((
        map(
            tuple((column, preceded(multispace1, tag_no_case("from")), preceded(multispace1, word))),
            |(col, _, start)| RawRule::From(col, start),
        ),
        map(
            tuple((column, preceded(multispace1, tag_no_case("until")), preceded(multispace1, word))),
            |(col, _, end)| RawRule::Until(col, end),
        ),
    ))(input)
}

fn date_arg(value: &str) -> FilterResult<NaiveDate> {
    TypeInference::parse_date(value).ok_or_else(|| FilterError::invalid_date(value))
}

/// Parse one rule expression
pub fn parse_rule(expression: &str) -> FilterResult<FilterRule> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(FilterError::EmptyExpression);
    }

    let (_, raw) = all_consuming(alt((numeric_rule, between_rule, bound_rule, text_rule)))(
        expression,
    )
    .map_err(|_| FilterError::unexpected_input(expression))?;

    match raw {
        RawRule::Numeric(_, _, value) if !value.is_finite() => {
            Err(FilterError::non_finite_threshold(value))
        }
        RawRule::Numeric(col, op, value) => Ok(FilterRule::numeric(col, op, value)),
        RawRule::Text(col, case_sensitive, tokens) => {
            let rule = FilterRule::text(col, tokens.split(','), case_sensitive);
            match &rule {
                FilterRule::Text(text) if text.tokens().is_empty() => Err(FilterError::EmptyTokens),
                _ => Ok(rule),
            }
        }
        RawRule::Between(col, start, end) => {
            Ok(FilterRule::date(col, Some(date_arg(start)?), Some(date_arg(end)?)))
        }
        RawRule::From(col, start) => Ok(FilterRule::date(col, Some(date_arg(start)?), None)),
        RawRule::Until(col, end) => Ok(FilterRule::date(col, None, Some(date_arg(end)?))),
    }
}

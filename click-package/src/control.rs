// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Defines primitives in control files.

Click packages reuse the Debian control file syntax: *paragraphs* of
`Field: Value` lines separated by blank lines. See
<https://www.debian.org/doc/debian-policy/ch-controlfields.html> for the
syntax. The same format backs the package status store.
*/

use {
    crate::error::{ClickError, Result},
    std::{
        borrow::Cow,
        io::{BufRead, Write},
    },
};

/// A field in a control file.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlField<'a> {
    name: Cow<'a, str>,
    value: Cow<'a, str>,
}

impl<'a> ControlField<'a> {
    /// Construct an instance from a field name and value.
    pub fn new(name: Cow<'a, str>, value: Cow<'a, str>) -> Self {
        Self { name, value }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Obtain the value as a [&str].
    ///
    /// The value's original file formatting (including newlines and leading whitespace
    /// of continuation lines) is included.
    pub fn value_str(&self) -> &str {
        self.value.as_ref()
    }

    /// Obtain an iterator of lines in the value.
    ///
    /// Leading whitespace from each line is stripped.
    pub fn iter_lines(&self) -> Box<(dyn Iterator<Item = &str> + '_)> {
        Box::new(self.value.lines().map(|x| x.trim_start()))
    }

    /// Write the contents of this field to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.name.as_bytes())?;
        writer.write_all(b": ")?;
        writer.write_all(self.value.as_ref().as_bytes())?;
        writer.write_all(b"\n")
    }

    /// Convert to an owned instance.
    pub fn into_owned(self) -> ControlField<'static> {
        ControlField {
            name: Cow::Owned(self.name.into_owned()),
            value: Cow::Owned(self.value.into_owned()),
        }
    }
}

/// A paragraph in a control file.
///
/// A paragraph is an ordered series of control fields.
///
/// Field names are case insensitive on read and case preserving on set.
///
/// Paragraphs can only contain a single occurrence of a field and this is enforced through
/// the mutation APIs.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlParagraph<'a> {
    fields: Vec<ControlField<'a>>,
}

impl<'a> ControlParagraph<'a> {
    /// Whether the paragraph is empty.
    ///
    /// Empty is defined by the lack of any fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field via a [ControlField].
    ///
    /// If a field with the same name (case insensitive compare) already exists, it is
    /// replaced in place, retaining its position.
    pub fn set_field(&mut self, field: ControlField<'a>) {
        if let Some(existing) = self
            .fields
            .iter_mut()
            .find(|cf| cf.name.eq_ignore_ascii_case(&field.name))
        {
            *existing = field;
        } else {
            self.fields.push(field);
        }
    }

    /// Set the value of a field defined via strings.
    pub fn set_field_from_string(&mut self, name: Cow<'a, str>, value: Cow<'a, str>) {
        self.set_field(ControlField::new(name, value));
    }

    /// Remove a field, returning it if present.
    pub fn remove_field(&mut self, name: &str) -> Option<ControlField<'a>> {
        let position = self
            .fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))?;

        Some(self.fields.remove(position))
    }

    /// Whether a named field is present in this paragraph.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterate over fields in this paragraph.
    ///
    /// Iteration order is insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField<'a>> {
        self.fields.iter()
    }

    /// Obtain the field with a given name in this paragraph.
    pub fn field(&self, name: &str) -> Option<&'_ ControlField<'a>> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Convert to an owned instance.
    pub fn into_owned(self) -> ControlParagraph<'static> {
        ControlParagraph {
            fields: self.fields.into_iter().map(|f| f.into_owned()).collect(),
        }
    }

    /// Serialize the paragraph to a writer.
    ///
    /// A trailing newline is written as part of the final field. However, an
    /// extra newline is not present. So if serializing multiple paragraphs, an
    /// additional line break must be written to effectively terminate this paragraph
    /// if the writer is not at EOF.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

/// Holds parsing state for control files.
///
/// Instances of this type are essentially fed lines of text and periodically emit
/// [ControlParagraph] instances as they are completed.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph<'static>,
    field: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// If the line terminates an in-progress paragraph, that paragraph will be returned.
    /// Otherwise `Ok(None)` is returned.
    ///
    /// `Err` is returned if the control file in invalid.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph<'static>>> {
        let is_empty_line = line.trim().is_empty();
        let is_indented = (line.starts_with(' ') || line.starts_with('\t')) && line.len() > 1;

        // Comment lines are permitted and ignored.
        if line.starts_with('#') {
            return Ok(None);
        }

        let current_field = self.field.take();

        // Empty lines signify the end of a paragraph. Flush any state.
        if is_empty_line {
            if let Some(field) = current_field {
                self.flush_field(field)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        match (current_field, is_indented) {
            // A field on the stack and an unindented line: this begins a new field.
            (Some(v), false) => {
                self.flush_field(v)?;
                self.field = Some(line.to_string());

                Ok(None)
            }
            // Continuation line without a field to continue.
            (None, true) => Err(ClickError::ControlParse(format!(
                "continuation line without a field: '{}'",
                line.trim_end()
            ))),
            (None, false) => {
                self.field = Some(line.to_string());

                Ok(None)
            }
            // Field value continuation.
            (Some(v), true) => {
                self.field = Some(v + line);

                Ok(None)
            }
        }
    }

    /// Finish parsing, consuming self.
    ///
    /// If a non-empty paragraph is present in the instance, it will be returned. Else if there
    /// is no unflushed state, None is returned.
    pub fn finish(mut self) -> Result<Option<ControlParagraph<'static>>> {
        if let Some(field) = self.field.take() {
            self.flush_field(field)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, v: String) -> Result<()> {
        let (name, value) = v.split_once(':').ok_or_else(|| {
            ClickError::ControlParse(format!("error parsing line '{}'; missing colon", v.trim_end()))
        })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(ClickError::ControlParse(format!(
                "error parsing line '{}'; empty field name",
                v.trim_end()
            )));
        }

        self.paragraph.set_field_from_string(
            Cow::Owned(name.to_string()),
            Cow::Owned(value.trim().to_string()),
        );

        Ok(())
    }
}

/// A reader for [ControlParagraph].
///
/// Instances are bound to a reader, which is capable of feeding lines into a parser.
///
/// Instances can be consumed as an iterator. Each call into the iterator will attempt to
/// read a full paragraph from the underlying reader.
pub struct ControlParagraphReader<R: BufRead> {
    reader: R,
    parser: Option<ControlFileParser>,
}

impl<R: BufRead> ControlParagraphReader<R> {
    /// Create a new instance bound to a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Some(ControlFileParser::default()),
        }
    }

    /// Consumes the instance, returning the original reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn get_next(&mut self) -> Result<Option<ControlParagraph<'static>>> {
        let mut parser = match self.parser.take() {
            Some(parser) => parser,
            None => return Ok(None),
        };

        loop {
            let mut line = String::new();

            let bytes_read = self.reader.read_line(&mut line)?;

            if bytes_read != 0 {
                if let Some(paragraph) = parser.write_line(&line)? {
                    self.parser.replace(parser);
                    return Ok(Some(paragraph));
                }
                // Continue reading.
            } else {
                return parser.finish();
            }
        }
    }
}

impl<R: BufRead> Iterator for ControlParagraphReader<R> {
    type Item = Result<ControlParagraph<'static>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.get_next() {
            Ok(Some(para)) => Some(Ok(para)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// A control file.
///
/// A control file is an ordered series of paragraphs.
#[derive(Clone, Debug, Default)]
pub struct ControlFile<'a> {
    paragraphs: Vec<ControlParagraph<'a>>,
}

impl<'a> ControlFile<'a> {
    /// Construct a new instance by parsing data from a reader.
    pub fn parse_reader<R: BufRead>(reader: &mut R) -> Result<Self> {
        let paragraphs =
            ControlParagraphReader::new(reader).collect::<Result<Vec<_>>>()?;

        Ok(Self { paragraphs })
    }

    /// Parse a control file from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        let mut reader = std::io::BufReader::new(s.as_bytes());
        Self::parse_reader(&mut reader)
    }

    /// Add a paragraph to this control file.
    pub fn add_paragraph(&mut self, p: ControlParagraph<'a>) {
        self.paragraphs.push(p);
    }

    /// Obtain paragraphs in this control file.
    pub fn paragraphs(&self) -> impl Iterator<Item = &ControlParagraph<'a>> {
        self.paragraphs.iter()
    }

    /// Obtain paragraphs in this control file, consuming self.
    pub fn into_paragraphs(self) -> impl Iterator<Item = ControlParagraph<'a>> {
        self.paragraphs.into_iter()
    }

    /// Serialize the control file to a writer.
    ///
    /// Every paragraph is followed by a blank line.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for p in &self.paragraphs {
            p.write(writer)?;
            writer.write_all(b"\n")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    #[test]
    fn control_paragraph_field_semantics() {
        let mut p = ControlParagraph::default();

        // Same cased field name results in overwrite.
        p.set_field_from_string("foo".into(), "bar".into());
        p.set_field_from_string("foo".into(), "baz".into());
        assert_eq!(p.field_str("foo"), Some("baz"));

        // Different case results in overwrite.
        p.set_field_from_string("FOO".into(), "bar".into());
        assert_eq!(p.field_str("foo"), Some("bar"));
        assert_eq!(p.field_str("FOO"), Some("bar"));
        assert_eq!(p.iter_fields().count(), 1);
        assert_eq!(p.iter_fields().next().unwrap().name(), "FOO");

        assert!(p.remove_field("Foo").is_some());
        assert!(p.is_empty());
    }

    #[test]
    fn overwrite_retains_position() {
        let mut p = ControlParagraph::default();
        p.set_field_from_string("Package".into(), "a".into());
        p.set_field_from_string("Version".into(), "1.0".into());
        p.set_field_from_string("package".into(), "b".into());

        let names = p.iter_fields().map(|f| f.name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["package", "Version"]);
    }

    #[test]
    fn parse_click_control() -> Result<()> {
        let control = ControlFile::parse_str(indoc! {"
            Package: com.example.hello
            Version: 1.0
            Click-Version: 0.1
            Description: hello world
             A longer description
             spanning lines.
            # comment
            Maintainer: Foo Bar <foo@example.org>
        "})?;

        let paragraphs = control.paragraphs().collect::<Vec<_>>();
        assert_eq!(paragraphs.len(), 1);
        let p = paragraphs[0];

        assert_eq!(p.field_str("package"), Some("com.example.hello"));
        assert_eq!(p.field_str("Click-Version"), Some("0.1"));
        assert_eq!(
            p.field("Description").unwrap().iter_lines().collect::<Vec<_>>(),
            vec!["hello world", "A longer description", "spanning lines."]
        );
        assert_eq!(p.field_str("Maintainer"), Some("Foo Bar <foo@example.org>"));

        Ok(())
    }

    #[test]
    fn parse_multiple_paragraphs() -> Result<()> {
        let paragraphs = ControlParagraphReader::new(std::io::Cursor::new(indoc! {"
            Package: a
            Status: install ok installed


            Package: b
            Status: install ok unpacked
        "}))
        .collect::<Result<Vec<_>>>()?;

        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].field_str("Package"), Some("a"));
        assert_eq!(paragraphs[1].field_str("Status"), Some("install ok unpacked"));

        Ok(())
    }

    #[test]
    fn parse_errors() {
        assert!(ControlFile::parse_str("Package foo\n").is_err());
        assert!(ControlFile::parse_str(" leading continuation\n").is_err());
        assert!(ControlFile::parse_str(": no name\n").is_err());
    }

    #[test]
    fn empty_input() -> Result<()> {
        assert_eq!(ControlFile::parse_str("")?.paragraphs().count(), 0);
        assert_eq!(ControlFile::parse_str("\n\n")?.paragraphs().count(), 0);

        Ok(())
    }

    #[test]
    fn write_roundtrip_preserves_case_and_order() -> Result<()> {
        let mut p = ControlParagraph::default();
        p.set_field_from_string("Package".into(), "test-package".into());
        p.set_field_from_string("Click-Version".into(), "0.1".into());

        let mut control = ControlFile::default();
        control.add_paragraph(p);

        let mut buffer = vec![];
        control.write(&mut buffer)?;
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "Package: test-package\nClick-Version: 0.1\n\n"
        );

        Ok(())
    }
}

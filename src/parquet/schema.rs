use serde::Serialize;

/// Primitive column type. Tag values follow the Parquet type family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhysicalType {
    Boolean,
    Int32,
    Int64,
    Int96,
    Float,
    Double,
    Binary,
    FixedLenByteArray,
}

impl PhysicalType {
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(PhysicalType::Boolean),
            1 => Some(PhysicalType::Int32),
            2 => Some(PhysicalType::Int64),
            3 => Some(PhysicalType::Int96),
            4 => Some(PhysicalType::Float),
            5 => Some(PhysicalType::Double),
            6 => Some(PhysicalType::Binary),
            7 => Some(PhysicalType::FixedLenByteArray),
            _ => None,
        }
    }

    pub fn tag(&self) -> i32 {
        match self {
            PhysicalType::Boolean => 0,
            PhysicalType::Int32 => 1,
            PhysicalType::Int64 => 2,
            PhysicalType::Int96 => 3,
            PhysicalType::Float => 4,
            PhysicalType::Double => 5,
            PhysicalType::Binary => 6,
            PhysicalType::FixedLenByteArray => 7,
        }
    }
}

/// How many times a field may appear in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Repetition {
    Required,
    Optional,
    Repeated,
}

impl Repetition {
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Repetition::Required),
            1 => Some(Repetition::Optional),
            2 => Some(Repetition::Repeated),
            _ => None,
        }
    }

    pub fn tag(&self) -> i32 {
        match self {
            Repetition::Required => 0,
            Repetition::Optional => 1,
            Repetition::Repeated => 2,
        }
    }
}

/// Semantic annotation layered over a physical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicalType {
    Utf8,
    Map,
    List,
    Decimal,
    Date,
    TimeMillis,
    TimestampMillis,
    Interval,
}

impl LogicalType {
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(LogicalType::Utf8),
            1 => Some(LogicalType::Map),
            2 => Some(LogicalType::List),
            3 => Some(LogicalType::Decimal),
            4 => Some(LogicalType::Date),
            5 => Some(LogicalType::TimeMillis),
            6 => Some(LogicalType::TimestampMillis),
            7 => Some(LogicalType::Interval),
            _ => None,
        }
    }

    pub fn tag(&self) -> i32 {
        match self {
            LogicalType::Utf8 => 0,
            LogicalType::Map => 1,
            LogicalType::List => 2,
            LogicalType::Decimal => 3,
            LogicalType::Date => 4,
            LogicalType::TimeMillis => 5,
            LogicalType::TimestampMillis => 6,
            LogicalType::Interval => 7,
        }
    }
}

/// One named column in a message type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub physical_type: PhysicalType,
    pub repetition: Repetition,
    pub logical_type: Option<LogicalType>,
    pub id: i32,
}

impl Field {
    pub fn new(name: &str, physical_type: PhysicalType, repetition: Repetition) -> Self {
        Self {
            name: name.to_string(),
            physical_type,
            repetition,
            logical_type: None,
            id: 0,
        }
    }

    pub fn required(name: &str, physical_type: PhysicalType) -> Self {
        Self::new(name, physical_type, Repetition::Required)
    }

    pub fn optional(name: &str, physical_type: PhysicalType) -> Self {
        Self::new(name, physical_type, Repetition::Optional)
    }

    pub fn repeated(name: &str, physical_type: PhysicalType) -> Self {
        Self::new(name, physical_type, Repetition::Repeated)
    }

    pub fn with_logical_type(mut self, logical_type: LogicalType) -> Self {
        self.logical_type = Some(logical_type);
        self
    }

    pub fn with_id(mut self, id: i32) -> Self {
        self.id = id;
        self
    }

    /// Binary columns annotated utf8 decode as strings; unannotated
    /// binary stays raw.
    pub fn is_utf8(&self) -> bool {
        self.physical_type == PhysicalType::Binary && self.logical_type == Some(LogicalType::Utf8)
    }
}

/// A named, versioned message type: the schema of one columnar file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageType {
    pub name: String,
    pub fields: Vec<Field>,
    pub version: u32,
    /// Predecessor schema, kept for annotation only; no migration logic.
    pub previous: Option<Box<MessageType>>,
}

impl MessageType {
    pub fn new(name: &str, fields: Vec<Field>) -> Self {
        Self {
            name: name.to_string(),
            fields,
            version: 1,
            previous: None,
        }
    }

    /// Produce the next schema version, keeping this one as predecessor.
    pub fn evolve(self, fields: Vec<Field>) -> Self {
        Self {
            name: self.name.clone(),
            fields,
            version: self.version + 1,
            previous: Some(Box::new(self)),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_stable() {
        for tag in 0..8 {
            assert_eq!(PhysicalType::from_tag(tag).unwrap().tag(), tag);
            assert_eq!(LogicalType::from_tag(tag).unwrap().tag(), tag);
        }
        for tag in 0..3 {
            assert_eq!(Repetition::from_tag(tag).unwrap().tag(), tag);
        }
        assert!(PhysicalType::from_tag(8).is_none());
        assert!(Repetition::from_tag(3).is_none());
        assert!(LogicalType::from_tag(-1).is_none());
    }

    #[test]
    fn test_field_builders() {
        let field = Field::required("name", PhysicalType::Binary)
            .with_logical_type(LogicalType::Utf8)
            .with_id(3);
        assert!(field.is_utf8());
        assert_eq!(field.id, 3);
        assert_eq!(field.repetition, Repetition::Required);

        let raw = Field::optional("blob", PhysicalType::Binary);
        assert!(!raw.is_utf8());
    }

    #[test]
    fn test_schema_evolution_keeps_predecessor() {
        let v1 = MessageType::new(
            "user",
            vec![Field::required("name", PhysicalType::Binary)],
        );
        let v2 = v1.clone().evolve(vec![
            Field::required("name", PhysicalType::Binary),
            Field::optional("age", PhysicalType::Int32),
        ]);

        assert_eq!(v2.version, 2);
        assert_eq!(v2.num_fields(), 2);
        let previous = v2.previous.as_deref().unwrap();
        assert_eq!(previous, &v1);
    }

    #[test]
    fn test_field_lookup() {
        let schema = MessageType::new(
            "user",
            vec![
                Field::required("name", PhysicalType::Binary),
                Field::required("age", PhysicalType::Int32),
            ],
        );
        assert_eq!(schema.field("age").unwrap().physical_type, PhysicalType::Int32);
        assert!(schema.field("missing").is_none());
    }
}

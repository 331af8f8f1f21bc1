pub struct Filter {
    page: u32,
}

pub fn get(filter: Query<Filter>, sort: Query) {}

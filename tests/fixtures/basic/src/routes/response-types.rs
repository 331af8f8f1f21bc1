pub struct HelloWorldQuery {
    name: String,
}

pub struct Greeting {
    message: String,
}

/// @summary read a greeting
pub fn get(query: Query<HelloWorldQuery>) -> Greeting {}

pub fn post(query: Query<HelloWorldQuery>) -> Vec<String> {}
